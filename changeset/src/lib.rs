//! Shared change and changeset types, plus the generator that groups a
//! timestamp-ordered stream of per-file changes into commit-equivalent
//! changesets.
//!
//! CVS records each file commit independently; a single `cvs commit` over
//! several files leaves one RCS revision per file, each with its own
//! timestamp. The types here reassemble those per-file records into the
//! original commits.

use std::{fmt::Display, str::FromStr};

use thiserror::Error;

mod generator;
pub use generator::ChangeSetGenerator;

/// Default quiet period, in seconds.
pub const QUIET_PERIOD: i64 = 60;

/// What a revision did to its file on the main line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Added => "A",
            FileStatus::Modified => "M",
            FileStatus::Deleted => "D",
        }
    }
}

impl Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(FileStatus::Added),
            "M" => Ok(FileStatus::Modified),
            "D" => Ok(FileStatus::Deleted),
            _ => Err(Error::BadFileStatus(s.into())),
        }
    }
}

/// A single revision of a single file.
///
/// Changes are dumb containers: they are produced by the RCS parser, inserted
/// into the metadata store by the scanner, and never mutated afterwards.
/// `(filename, revision)` is unique across the whole system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Seconds since the epoch, UTC.
    pub timestamp: i64,
    pub author: String,
    pub log: String,
    pub filestatus: FileStatus,
    /// Working-copy relative path, with any Attic component stripped.
    pub filename: String,
    /// Dotted revision number, e.g. "1.4".
    pub revision: String,
    /// RCS state identifier, e.g. "Exp" or "dead".
    pub state: String,
    /// "b" for binary files, empty otherwise.
    pub mode: String,
}

/// A set of changes believed to originate from one CVS commit.
///
/// All members share author and log, and no two members name the same file.
/// The `id` is assigned when the changeset is durably inserted into the
/// metadata store; the `mark` is assigned once the export sink has
/// acknowledged the corresponding commit. Everything else is immutable.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub id: Option<i64>,
    pub start_time: i64,
    pub end_time: i64,
    pub mark: Option<String>,
    changes: Vec<Change>,
}

impl ChangeSet {
    /// Opens a new changeset with `change` as its sole member.
    pub fn new(change: Change) -> Self {
        Self {
            id: None,
            start_time: change.timestamp,
            end_time: change.timestamp,
            mark: None,
            changes: vec![change],
        }
    }

    /// Rebuilds a changeset from its stored parts. `changes` must be
    /// non-empty and obey the membership invariants; the store guarantees
    /// this for rows it hydrates.
    pub fn from_parts(
        id: i64,
        start_time: i64,
        end_time: i64,
        mark: Option<String>,
        changes: Vec<Change>,
    ) -> Self {
        Self {
            id: Some(id),
            start_time,
            end_time,
            mark,
            changes,
        }
    }

    pub fn author(&self) -> &str {
        &self.changes[0].author
    }

    pub fn log(&self) -> &str {
        &self.changes[0].log
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }

    pub fn contains_file(&self, filename: &str) -> bool {
        self.changes.iter().any(|c| c.filename == filename)
    }

    /// The timestamp the changeset is exported with.
    ///
    /// This is one second after the last member change. CVS, asked for a
    /// checkout at exactly a revision's instant, favours a newly imported
    /// "1.1" over a vendor "1.1.1.1" sharing the same second; the bias makes
    /// `cvs co -D <timestamp>` reproduce the exported tree.
    pub fn effective_timestamp(&self) -> i64 {
        self.end_time + 1
    }

    /// Attempts to integrate `change` into this changeset.
    ///
    /// Integration succeeds iff the author and log match and the file is not
    /// already part of the set. On failure the change is handed back to the
    /// caller untouched.
    pub fn integrate(&mut self, change: Change) -> Result<(), Change> {
        if change.author != self.author()
            || change.log != self.log()
            || self.contains_file(&change.filename)
        {
            return Err(change);
        }

        if change.timestamp < self.start_time {
            self.start_time = change.timestamp;
        } else if change.timestamp > self.end_time {
            self.end_time = change.timestamp;
        }

        self.changes.push(change);
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown file status: {0:?}")]
    BadFileStatus(String),
}

#[cfg(test)]
pub(crate) fn test_change(filename: &str, timestamp: i64, author: &str, log: &str) -> Change {
    Change {
        timestamp,
        author: author.into(),
        log: log.into(),
        filestatus: FileStatus::Modified,
        filename: filename.into(),
        revision: "1.2".into(),
        state: "Exp".into(),
        mode: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_status_round_trip() {
        for status in [FileStatus::Added, FileStatus::Modified, FileStatus::Deleted].iter() {
            assert_eq!(status.as_str().parse::<FileStatus>().unwrap(), *status);
        }

        assert!(matches!(
            "x".parse::<FileStatus>(),
            Err(Error::BadFileStatus(_))
        ));
    }

    #[test]
    fn test_integrate() {
        let mut cs = ChangeSet::new(test_change("todo.txt", 1303768248, "jack", "Initial commit"));

        cs.integrate(test_change("README", 1303768249, "jack", "Initial commit"))
            .unwrap();

        assert_eq!(cs.author(), "jack");
        assert_eq!(cs.log(), "Initial commit");
        assert_eq!(cs.start_time, 1303768248);
        assert_eq!(cs.end_time, 1303768249);
        assert_eq!(cs.effective_timestamp(), 1303768250);
        assert!(cs.contains_file("README"));

        // Same file again: rejected, change handed back.
        let dup = test_change("README", 1303768250, "jack", "Initial commit");
        assert_eq!(cs.integrate(dup.clone()), Err(dup));

        // Different author or log: rejected.
        assert!(cs
            .integrate(test_change("other", 1303768250, "jill", "Initial commit"))
            .is_err());
        assert!(cs
            .integrate(test_change("other", 1303768250, "jack", "Something else"))
            .is_err());

        // An earlier change moves start_time backwards.
        cs.integrate(test_change("early", 1303768240, "jack", "Initial commit"))
            .unwrap();
        assert_eq!(cs.start_time, 1303768240);
        assert_eq!(cs.end_time, 1303768249);
    }
}
