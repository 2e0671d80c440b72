use std::io::{self, Write};

use crate::{Error, Identity, Mark};

/// A single commit command, file operations included.
#[derive(Debug)]
pub struct Commit {
    branch_ref: String,
    mark: Option<Mark>,
    committer: Identity,
    message: Vec<u8>,
    parent: Option<Parent>,
    commands: Vec<FileCommand>,
}

/// How a commit is linked to history.
#[derive(Debug, Clone)]
pub enum Parent {
    /// `from :<mark>`: a commit emitted earlier in this stream.
    Mark(Mark),
    /// `from <ref>^0`: the current tip of a ref that already exists in the
    /// repository, used for the first commit of an incremental run.
    Ref(String),
}

impl Commit {
    pub(crate) fn write(&self, writer: &mut impl io::Write) -> Result<(), Error> {
        // Serialise into a buffer first so a commit hits the pipe in one
        // write.
        let mut buf = Vec::new();
        writeln!(buf, "commit {}", self.branch_ref)?;
        if let Some(mark) = self.mark {
            writeln!(buf, "mark {}", mark)?;
        }
        writeln!(buf, "committer {}", self.committer)?;
        writeln!(buf, "data {}", self.message.len())?;
        buf.write_all(&self.message)?;
        buf.push(b'\n');
        match &self.parent {
            Some(Parent::Mark(mark)) => writeln!(buf, "from {}", mark)?,
            Some(Parent::Ref(branch_ref)) => writeln!(buf, "from {}^0", branch_ref)?,
            None => {}
        }
        for command in self.commands.iter() {
            command.write(&mut buf)?;
        }

        Ok(writer.write_all(&buf)?)
    }

    pub fn mark(&self) -> Option<Mark> {
        self.mark
    }
}

#[derive(Debug)]
pub struct CommitBuilder {
    branch_ref: String,
    mark: Option<Mark>,
    committer: Option<Identity>,
    message: Option<Vec<u8>>,
    parent: Option<Parent>,
    commands: Vec<FileCommand>,
}

impl CommitBuilder {
    pub fn new(branch_ref: String) -> Self {
        Self {
            branch_ref,
            mark: None,
            committer: None,
            message: None,
            parent: None,
            commands: Vec::new(),
        }
    }

    /// Asks the sink to remember this commit under `mark`. Commits that are
    /// never referred back to (note commits) can go without one.
    pub fn mark(&mut self, mark: Mark) -> &mut Self {
        self.mark = Some(mark);
        self
    }

    pub fn committer(&mut self, committer: Identity) -> &mut Self {
        self.committer = Some(committer);
        self
    }

    pub fn message(&mut self, message: Vec<u8>) -> &mut Self {
        self.message = Some(message);
        self
    }

    pub fn parent(&mut self, parent: Parent) -> &mut Self {
        self.parent = Some(parent);
        self
    }

    pub fn add_file_command(&mut self, command: FileCommand) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn build(self) -> Result<Commit, Error> {
        let committer = self.committer.ok_or(Error::MissingCommitter)?;
        let message = self.message.ok_or(Error::MissingCommitMessage)?;

        Ok(Commit {
            branch_ref: self.branch_ref,
            mark: self.mark,
            committer,
            message,
            parent: self.parent,
            commands: self.commands,
        })
    }
}

/// A file operation within a commit.
#[derive(Debug, Clone)]
pub enum FileCommand {
    /// `M <mode> inline <path>` followed by the file content.
    Modify {
        mode: FileMode,
        path: String,
        data: Vec<u8>,
    },
    /// `D <path>`.
    Delete { path: String },
    /// `N inline :<mark>` followed by note content, attached to the commit
    /// identified by the mark. Only meaningful on a notes ref.
    Note { target: Mark, data: Vec<u8> },
}

impl FileCommand {
    fn write(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        match self {
            FileCommand::Modify { mode, path, data } => {
                writeln!(buf, "M {} inline {}", mode.as_str(), path)?;
                writeln!(buf, "data {}", data.len())?;
                buf.write_all(data)?;
                buf.push(b'\n');
            }
            FileCommand::Delete { path } => {
                writeln!(buf, "D {}", path)?;
            }
            FileCommand::Note { target, data } => {
                writeln!(buf, "N inline {}", target)?;
                writeln!(buf, "data {}", data.len())?;
                buf.write_all(data)?;
                buf.push(b'\n');
            }
        }

        Ok(())
    }
}

/// File permissions, reduced to the two modes CVS can represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Normal,
    Executable,
}

impl FileMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileMode::Normal => "0644",
            FileMode::Executable => "0755",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_stream() {
        let mut builder = CommitBuilder::new("refs/cvs/HEAD".into());
        builder
            .mark(Mark(1))
            .committer(Identity::new(
                Some("Some Dude".into()),
                "dude@example.com".into(),
                1303770649,
            ))
            .message(b"Initial commit\n".to_vec())
            .add_file_command(FileCommand::Modify {
                mode: FileMode::Normal,
                path: "dir/file".into(),
                data: b"contents\n".to_vec(),
            })
            .add_file_command(FileCommand::Delete {
                path: "dir/gone".into(),
            });

        let mut out = Vec::new();
        builder.build().unwrap().write(&mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "commit refs/cvs/HEAD\n\
             mark :1\n\
             committer Some Dude <dude@example.com> 1303770649 +0000\n\
             data 15\nInitial commit\n\n\
             M 0644 inline dir/file\n\
             data 9\ncontents\n\n\
             D dir/gone\n"
        );
    }

    #[test]
    fn test_parents() {
        let mut builder = CommitBuilder::new("refs/cvs/HEAD".into());
        builder
            .mark(Mark(2))
            .committer(Identity::new(None, "uwe".into(), 1))
            .message(b"m".to_vec())
            .parent(Parent::Mark(Mark(1)));
        let mut out = Vec::new();
        builder.build().unwrap().write(&mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("\nfrom :1\n"));

        let mut builder = CommitBuilder::new("refs/cvs/HEAD".into());
        builder
            .committer(Identity::new(None, "uwe".into(), 1))
            .message(b"m".to_vec())
            .parent(Parent::Ref("refs/cvs/HEAD".into()));
        let mut out = Vec::new();
        builder.build().unwrap().write(&mut out).unwrap();
        let stream = String::from_utf8(out).unwrap();
        assert!(stream.contains("\nfrom refs/cvs/HEAD^0\n"));
        // No mark was requested, so no mark line is written.
        assert!(!stream.contains("\nmark "));
    }

    #[test]
    fn test_missing_fields() {
        let builder = CommitBuilder::new("refs/cvs/HEAD".into());
        assert!(matches!(builder.build(), Err(Error::MissingCommitter)));

        let mut builder = CommitBuilder::new("refs/cvs/HEAD".into());
        builder.committer(Identity::new(None, "uwe".into(), 1));
        assert!(matches!(builder.build(), Err(Error::MissingCommitMessage)));
    }
}
