//! A thin wrapper around the `git` command line.
//!
//! Everything the importer needs from Git outside the fast-import stream is
//! plumbing: init, config, ref queries, and working-tree updates after an
//! import.

use std::{
    path::{Path, PathBuf},
    process::{Command, Output},
};

use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("cannot run git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("git {command} failed with {status}\n{stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct Git {
    work_dir: PathBuf,
    git_dir: PathBuf,
}

impl Git {
    /// Creates a new repository at `directory` and opens it.
    pub(crate) fn init(directory: &Path, bare: bool) -> Result<Self, Error> {
        let mut command = Command::new("git");
        command.arg("init").arg("--quiet");
        if bare {
            command.arg("--bare");
        }
        command.arg(directory);
        run(command, "init")?;

        Self::open(directory)
    }

    /// Opens an existing repository at or above `directory`.
    pub(crate) fn open(directory: &Path) -> Result<Self, Error> {
        let output = run(git_in(directory, &["rev-parse", "--git-dir"]), "rev-parse")?;
        let raw = String::from_utf8_lossy(&output.stdout).trim().to_string();

        let git_dir = if Path::new(&raw).is_absolute() {
            PathBuf::from(raw)
        } else {
            directory.join(raw)
        };

        Ok(Self {
            work_dir: directory.to_path_buf(),
            git_dir,
        })
    }

    pub(crate) fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub(crate) fn config_get(&self, key: &str) -> Result<Option<String>, Error> {
        let output = self
            .command()
            .args(&["config", "--get", key])
            .output()
            .map_err(Error::Spawn)?;

        // config --get exits 1 for an unset key.
        if output.status.success() {
            Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ))
        } else if output.status.code() == Some(1) && output.stdout.is_empty() {
            Ok(None)
        } else {
            Err(failed("config", &output))
        }
    }

    pub(crate) fn config_set(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut command = self.command();
        command.args(&["config", key, value]);
        run(command, "config").map(|_| ())
    }

    pub(crate) fn ref_exists(&self, name: &str) -> Result<bool, Error> {
        let output = self
            .command()
            .args(&["rev-parse", "--verify", "--quiet", name])
            .output()
            .map_err(Error::Spawn)?;

        Ok(output.status.success())
    }

    /// Points the current branch and working tree at `target`; used by clone
    /// to produce the initial checkout.
    pub(crate) fn reset_hard(&self, target: &str) -> Result<(), Error> {
        let mut command = self.command();
        command.args(&["reset", "--hard", target]);
        run(command, "reset").map(|_| ())
    }

    /// Fast-forwards the current branch to `target`.
    pub(crate) fn merge_ff(&self, target: &str) -> Result<(), Error> {
        let mut command = self.command();
        command.args(&["merge", "--ff-only", target]);
        run(command, "merge").map(|_| ())
    }

    /// A `git` command pre-configured for this repository. The exporter uses
    /// this to spawn `git fast-import` with its own pipe setup.
    pub(crate) fn command(&self) -> Command {
        let mut command = Command::new("git");
        command.arg("-C").arg(&self.work_dir);
        command
    }
}

fn git_in(directory: &Path, args: &[&str]) -> Command {
    let mut command = Command::new("git");
    command.arg("-C").arg(directory).args(args);
    command
}

fn run(mut command: Command, name: &str) -> Result<Output, Error> {
    let output = command.output().map_err(Error::Spawn)?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(failed(name, &output))
    }
}

fn failed(name: &str, output: &Output) -> Error {
    Error::Failed {
        command: name.into(),
        status: output
            .status
            .code()
            .map(|code| format!("exit code {}", code))
            .unwrap_or_else(|| "a signal".into()),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}
