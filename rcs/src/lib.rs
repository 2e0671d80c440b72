//! Parser and checkout engine for RCS ",v" files.
//!
//! An RCS file stores the newest trunk revision as full text and every other
//! revision as an edit script relative to its neighbour. [`parse`] reads the
//! whole container; [`File::main_line`] walks the revisions that are visible
//! on the main line, including CVS's vendor-branch quirk; and
//! [`File::checkout`] reconstructs the full text of any revision by applying
//! delta chains.

use std::collections::HashMap;

use nom::Finish;

pub mod edit;
mod error;
pub mod keyword;
mod num;
mod parser;

pub use error::Error;
pub use num::Num;

/// Parses a full RCS file.
pub fn parse(input: &[u8]) -> Result<File, Error> {
    Ok(Finish::finish(parser::file(input))
        .map_err(|e| Error::Parse {
            location: String::from_utf8_lossy(&e.input[..e.input.len().min(32)]).into_owned(),
            kind: e.code,
        })?
        .1)
}

/// A parsed RCS file.
#[derive(Debug, Clone)]
pub struct File {
    pub admin: Admin,
    pub desc: Vec<u8>,
    deltas: HashMap<Num, Delta>,
    texts: HashMap<Num, DeltaText>,
}

/// The administrative header of an RCS file.
#[derive(Debug, Clone)]
pub struct Admin {
    pub head: Option<Num>,
    /// The default branch. CVS sets this to the vendor branch for files that
    /// were imported and never modified on the trunk.
    pub branch: Option<Num>,
    pub access: Vec<Vec<u8>>,
    pub symbols: Vec<(Vec<u8>, Num)>,
    pub locks: Vec<(Vec<u8>, Num)>,
    pub strict: bool,
    pub comment: Option<Vec<u8>>,
    pub expand: Option<Vec<u8>>,
}

/// Header data of a single revision.
#[derive(Debug, Clone)]
pub struct Delta {
    /// Seconds since the epoch, UTC.
    pub date: i64,
    pub author: Vec<u8>,
    pub state: Vec<u8>,
    pub branches: Vec<Num>,
    pub next: Option<Num>,
}

impl Delta {
    pub fn is_dead(&self) -> bool {
        self.state == b"dead"
    }
}

/// Log message and text (full text or edit script) of a single revision.
#[derive(Debug, Clone)]
pub struct DeltaText {
    pub log: Vec<u8>,
    pub text: Vec<u8>,
}

/// What a main-line revision did to the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionStatus {
    Added,
    Modified,
    Dead,
}

/// One revision on the main-line path.
#[derive(Debug)]
pub struct MainLineRevision<'a> {
    pub num: &'a Num,
    pub date: i64,
    pub author: &'a [u8],
    pub state: &'a [u8],
    pub log: &'a [u8],
    pub status: RevisionStatus,
}

impl File {
    pub fn head(&self) -> Option<&Num> {
        self.admin.head.as_ref()
    }

    pub fn delta(&self, num: &Num) -> Option<&Delta> {
        self.deltas.get(num)
    }

    pub fn log(&self, num: &Num) -> Option<&[u8]> {
        self.texts.get(num).map(|text| text.log.as_slice())
    }

    /// True when the file is stored with binary expansion mode (`expand b`),
    /// which maps to working-copy mode "b".
    pub fn is_binary(&self) -> bool {
        matches!(self.admin.expand.as_deref(), Some(b"b"))
    }

    /// The revisions visible on the main line, oldest first.
    ///
    /// Iteration begins at `head` and follows `next` links. With a non-empty
    /// `branch` header the path additionally runs through the vendor branch:
    /// from the branchpoint it follows the first branch child on the default
    /// branch, then that branch's `next` links. Two fixups keep the result
    /// free of duplicates:
    ///
    /// - a dead "1.1" never existed on the main line (the file was first
    ///   added on a branch) and is skipped entirely;
    /// - a live branchpoint and the first vendor revision describe the same
    ///   import, so only the branchpoint is kept, carrying the vendor
    ///   revision's log message.
    pub fn main_line(&self) -> Result<Vec<MainLineRevision<'_>>, Error> {
        let head = match self.head() {
            Some(head) => head,
            None => return Ok(Vec::new()),
        };

        // Trunk deltas chain backwards in time; reversed, the branchpoint
        // comes first.
        let mut line = self.chain(head)?;
        line.reverse();

        let mut vendor_log: Option<(&Num, &Num)> = None;
        if let Some(branch) = &self.admin.branch {
            let point = line[0];
            let point_delta = self.delta_or_missing(point)?;

            if let Some(first) = point_delta
                .branches
                .iter()
                .find(|child| child.is_on_branch(branch))
            {
                let mut vendor = self.chain(first)?;
                if !point_delta.is_dead() {
                    vendor.remove(0);
                    vendor_log = Some((point, first));
                }
                line.splice(1..1, vendor);
            }
        }

        let mut revisions = Vec::with_capacity(line.len());
        let mut oldest = true;
        for num in line {
            let delta = self.delta_or_missing(num)?;
            let dead = delta.is_dead();

            if dead && num.is_initial() {
                log::trace!("skipping dead initial revision {}", num);
                continue;
            }

            let status = if dead {
                RevisionStatus::Dead
            } else if oldest {
                RevisionStatus::Added
            } else {
                RevisionStatus::Modified
            };
            oldest = false;

            let log_num = match vendor_log {
                Some((point, first)) if point == num => first,
                _ => num,
            };

            revisions.push(MainLineRevision {
                num,
                date: delta.date,
                author: &delta.author,
                state: &delta.state,
                log: self
                    .texts
                    .get(log_num)
                    .map(|text| text.log.as_slice())
                    .ok_or_else(|| Error::missing(log_num))?,
                status,
            });
        }

        Ok(revisions)
    }

    /// Reconstructs the full text of `revision`.
    pub fn checkout(&self, revision: &Num) -> Result<Vec<u8>, Error> {
        let head = self.head().ok_or_else(|| Error::Checkout {
            revision: revision.to_string(),
        })?;

        let mut path = Vec::new();
        if !self.delta_path(head, revision, &mut path) {
            return Err(Error::Checkout {
                revision: revision.to_string(),
            });
        }

        // The head stores full text; everything below it is an edit script
        // relative to the previous revision on the path.
        let mut lines = edit::split_lines(self.text_or_missing(path[0])?);
        for num in &path[1..] {
            let script =
                edit::Script::parse(self.text_or_missing(num)?).map_err(|source| Error::Edit {
                    revision: num.to_string(),
                    source,
                })?;
            lines = script.apply(lines).map_err(|source| Error::Edit {
                revision: num.to_string(),
                source,
            })?;
        }

        Ok(edit::join_lines(lines))
    }

    /// The delta chain starting at `from`, following `next` links.
    fn chain<'a>(&'a self, from: &'a Num) -> Result<Vec<&'a Num>, Error> {
        let mut chain = Vec::new();
        let mut cur = from;
        loop {
            let delta = self.delta_or_missing(cur)?;
            chain.push(cur);
            match &delta.next {
                Some(next) => cur = next,
                None => break,
            }
        }
        Ok(chain)
    }

    /// Depth-first search for `target` along `next` links and branches,
    /// recording the revisions whose deltas must be applied in order.
    fn delta_path<'a>(&'a self, from: &'a Num, target: &Num, path: &mut Vec<&'a Num>) -> bool {
        path.push(from);
        if from == target {
            return true;
        }

        if let Some(delta) = self.deltas.get(from) {
            if let Some(next) = &delta.next {
                if self.delta_path(next, target, path) {
                    return true;
                }
            }
            for branch in &delta.branches {
                if self.delta_path(branch, target, path) {
                    return true;
                }
            }
        }

        path.pop();
        false
    }

    fn delta_or_missing(&self, num: &Num) -> Result<&Delta, Error> {
        self.deltas.get(num).ok_or_else(|| Error::missing(num))
    }

    fn text_or_missing(&self, num: &Num) -> Result<&[u8], Error> {
        self.texts
            .get(num)
            .map(|text| text.text.as_slice())
            .ok_or_else(|| Error::missing(num))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(s: &str) -> Num {
        s.parse().unwrap()
    }

    #[test]
    fn test_main_line_trunk() {
        let file = parse(include_bytes!("fixtures/hello.c,v")).unwrap();
        let revisions = file.main_line().unwrap();

        assert_eq!(revisions.len(), 2);

        assert_eq!(*revisions[0].num, num("1.1"));
        assert_eq!(revisions[0].status, RevisionStatus::Added);
        assert_eq!(revisions[0].author, b"uwe");
        assert_eq!(revisions[0].log, b"Initial revision\n");

        assert_eq!(*revisions[1].num, num("1.2"));
        assert_eq!(revisions[1].status, RevisionStatus::Modified);
        assert_eq!(revisions[1].log, b"Add a greeting\n");
        assert!(revisions[0].date < revisions[1].date);
    }

    #[test]
    fn test_checkout_trunk() {
        let file = parse(include_bytes!("fixtures/hello.c,v")).unwrap();

        let head = file.checkout(&num("1.2")).unwrap();
        assert!(head.starts_with(b"#include <stdio.h>\n"));
        assert!(head
            .windows(b"printf".len())
            .any(|window| window == b"printf"));

        // 1.1 is 1.2 with the printf line deleted.
        let old = file.checkout(&num("1.1")).unwrap();
        assert!(!old.windows(b"printf".len()).any(|window| window == b"printf"));
        assert_eq!(old.iter().filter(|&&b| b == b'\n').count(), 6);

        assert!(matches!(
            file.checkout(&num("1.3")),
            Err(Error::Checkout { .. })
        ));
    }

    #[test]
    fn test_main_line_vendor_branch() {
        // Head 1.1 with a default branch: the main line runs through the
        // vendor branch, and the import appears exactly once, as 1.1 with
        // the vendor revision's log.
        let file = parse(include_bytes!("fixtures/vendor.c,v")).unwrap();
        let revisions = file.main_line().unwrap();

        assert_eq!(revisions.len(), 2);

        assert_eq!(*revisions[0].num, num("1.1"));
        assert_eq!(revisions[0].status, RevisionStatus::Added);
        assert_eq!(revisions[0].log, b"Import the widget library\n");

        assert_eq!(*revisions[1].num, num("1.1.1.2"));
        assert_eq!(revisions[1].status, RevisionStatus::Modified);
        assert_eq!(revisions[1].log, b"Update to widget 1.1\n");
    }

    #[test]
    fn test_checkout_vendor_branch() {
        let file = parse(include_bytes!("fixtures/vendor.c,v")).unwrap();

        assert_eq!(file.checkout(&num("1.1")).unwrap(), b"int x;\n");
        assert_eq!(file.checkout(&num("1.1.1.1")).unwrap(), b"int x;\n");
        assert_eq!(file.checkout(&num("1.1.1.2")).unwrap(), b"int x;\nint y;\n");
    }

    #[test]
    fn test_main_line_initial_on_branch() {
        // 1.1 is dead because the file was first added on a branch; the
        // single main-line change is the branch revision itself.
        let file = parse(include_bytes!("fixtures/onbranch.c,v")).unwrap();
        let revisions = file.main_line().unwrap();

        assert_eq!(revisions.len(), 1);
        assert_eq!(*revisions[0].num, num("1.1.1.1"));
        assert_eq!(revisions[0].status, RevisionStatus::Added);
        assert_eq!(revisions[0].author, b"jack");
        assert_eq!(revisions[0].log, b"Add the patch\n");

        assert_eq!(
            file.checkout(&num("1.1.1.1")).unwrap(),
            b"patch content\n"
        );
    }

    #[test]
    fn test_empty_head() {
        let file = parse(b"head;\naccess;\nsymbols;\nlocks;\ndesc\n@@\n").unwrap();
        assert!(file.main_line().unwrap().is_empty());
    }
}
