use std::fmt::Display;

/// A committer or author identity in fast-import's raw date format.
#[derive(Debug, Clone)]
pub struct Identity {
    name: Option<String>,
    email: String,
    /// Seconds since the epoch; the importer only deals in UTC.
    when: i64,
}

impl Identity {
    pub fn new(name: Option<String>, email: String, when: i64) -> Self {
        Self { name, email, when }
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{} ", name)?;
        }
        write!(f, "<{}> {} +0000", self.email, self.when)
    }
}
