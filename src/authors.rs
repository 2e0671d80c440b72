//! CVS login to Git identity mapping.
//!
//! The authors file has one mapping per line: `login Full Name` or
//! `login Full Name <email>`. Logins without a mapping fall back to the
//! bare login as their address, or `login@domain` when a default domain is
//! configured. The mapping is time-invariant; re-use of a login by
//! different people over the years is not modelled.

use std::{collections::HashMap, fs, io, path::Path};

use git_fast_import::Identity;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("cannot read authors file {}: {source}", .path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed authors file line {line}: {content:?}")]
    Malformed { line: usize, content: String },

    #[error("no author mapping for: {}", .0.join(", "))]
    UnknownAuthors(Vec<String>),
}

#[derive(Debug, Clone)]
struct Author {
    name: String,
    email: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct AuthorMap {
    map: HashMap<String, Author>,
    domain: Option<String>,
}

impl AuthorMap {
    /// An empty mapping; every identity falls back to the login.
    pub(crate) fn new(domain: Option<String>) -> Self {
        Self {
            map: HashMap::new(),
            domain,
        }
    }

    pub(crate) fn load(path: &Path, domain: Option<String>) -> Result<Self, Error> {
        let content = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut map = HashMap::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (login, author) = parse_line(line).ok_or_else(|| Error::Malformed {
                line: index + 1,
                content: line.into(),
            })?;
            map.insert(login, author);
        }

        Ok(Self { map, domain })
    }

    /// The Git identity for a login at a given time.
    pub(crate) fn identity(&self, login: &str, when: i64) -> Identity {
        match self.map.get(login) {
            Some(author) => Identity::new(
                Some(author.name.clone()),
                author
                    .email
                    .clone()
                    .unwrap_or_else(|| self.fallback_email(login)),
                when,
            ),
            None => Identity::new(None, self.fallback_email(login), when),
        }
    }

    /// Fails if any of `logins` has no mapping. Used before any commit is
    /// emitted when `--stop-on-unknown-author` is in effect.
    pub(crate) fn check_known<'a, I>(&self, logins: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut missing: Vec<String> = logins
            .into_iter()
            .filter(|login| !self.map.contains_key(*login))
            .map(String::from)
            .collect();
        missing.sort();
        missing.dedup();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::UnknownAuthors(missing))
        }
    }

    fn fallback_email(&self, login: &str) -> String {
        match &self.domain {
            Some(domain) => format!("{}@{}", login, domain),
            None => login.into(),
        }
    }
}

fn parse_line(line: &str) -> Option<(String, Author)> {
    let (login, rest) = line.split_once(char::is_whitespace)?;
    let rest = rest.trim();

    let (name, email) = if rest.ends_with('>') {
        let open = rest.rfind('<')?;
        (
            rest[..open].trim(),
            Some(rest[open + 1..rest.len() - 1].to_string()),
        )
    } else {
        (rest, None)
    };

    if name.is_empty() && email.is_none() {
        return None;
    }

    Some((
        login.to_string(),
        Author {
            name: name.to_string(),
            email,
        },
    ))
}
