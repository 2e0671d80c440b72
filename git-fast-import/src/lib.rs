//! A writer for the [git-fast-import
//! format](https://git-scm.com/docs/git-fast-import).
//!
//! Unlike a general-purpose fast-import client, this writer emits file
//! content inline with each commit rather than as separate blob commands:
//! the caller assigns commit marks itself (the importer uses its changeset
//! ids), so no mark bookkeeping happens here. The marks the sink writes out
//! via `--export-marks` can be read back with [`marks::parse`].

use std::{fmt::Debug, io::Write};

mod commit;
pub use commit::{Commit, CommitBuilder, FileCommand, FileMode, Parent};

mod error;
pub use error::Error;

mod identity;
pub use identity::Identity;

mod mark;
pub use mark::Mark;

pub mod marks;

/// A writer that serialises commands in the git-fast-import wire format.
#[derive(Debug)]
pub struct Writer<W>
where
    W: Write + Debug,
{
    writer: W,
}

impl<W> Writer<W>
where
    W: Write + Debug,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Sends one commit to the sink.
    pub fn commit(&mut self, commit: &Commit) -> Result<(), Error> {
        commit.write(&mut self.writer)
    }

    /// Sends a `progress` command, which the sink echoes on its stdout.
    pub fn progress(&mut self, message: &str) -> Result<(), Error> {
        Ok(writeln!(self.writer, "progress {}", message)?)
    }

    /// Sends a `checkpoint` command, asking the sink to flush its state.
    pub fn checkpoint(&mut self) -> Result<(), Error> {
        Ok(writeln!(self.writer, "checkpoint")?)
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        Ok(self.writer.flush()?)
    }

    /// Consumes the writer, handing the underlying stream back so the caller
    /// can close it and wait for the sink to exit.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_and_checkpoint() {
        let mut writer = Writer::new(Vec::new());
        writer.progress("10 of 20").unwrap();
        writer.checkpoint().unwrap();

        assert_eq!(writer.into_inner(), b"progress 10 of 20\ncheckpoint\n");
    }
}
