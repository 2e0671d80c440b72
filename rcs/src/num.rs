use std::{convert::TryFrom, fmt::Display, str::FromStr};

use itertools::Itertools;

use crate::Error;

/// A dotted RCS revision or branch number, such as "1.4" or "1.1.1".
///
/// Revision numbers have an even number of components, branch numbers an odd
/// number. Comparison and hashing are component-wise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Num(Vec<u32>);

impl Num {
    pub fn parts(&self) -> &[u32] {
        &self.0
    }

    /// True for trunk revisions like "1.4".
    pub fn is_trunk(&self) -> bool {
        self.0.len() == 2
    }

    /// True for the conventional initial trunk revision "1.1".
    pub fn is_initial(&self) -> bool {
        self.0 == [1, 1]
    }

    /// True if this revision sits directly on `branch`: "1.1.1.1" is on
    /// "1.1.1", but "1.1.1.1.2.1" is not.
    pub fn is_on_branch(&self, branch: &Num) -> bool {
        self.0.len() == branch.0.len() + 1 && self.0[..branch.0.len()] == branch.0[..]
    }
}

impl FromStr for Num {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<u32>, _>>()
            .map_err(|_| Error::BadNum(s.into()))?;

        if parts.is_empty() {
            return Err(Error::BadNum(s.into()));
        }

        Ok(Self(parts))
    }
}

impl TryFrom<&[u8]> for Num {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        std::str::from_utf8(value)
            .map_err(|_| Error::BadNum(String::from_utf8_lossy(value).into_owned()))?
            .parse()
    }
}

impl Display for Num {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().join("."))
    }
}
