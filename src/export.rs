//! Streaming changesets to `git fast-import`.
//!
//! The exporter walks the unmarked changesets in `(start_time, id)` order,
//! writes one commit per changeset to a fast-import child process, and
//! records the marks the sink reports back. Terminating signals are
//! observed at changeset boundaries only: the stream is always closed
//! cleanly, the marks are always read back, and the child itself runs with
//! those signals ignored so a terminal Ctrl-C cannot kill it mid-stream.

use std::{
    io,
    path::Path,
    process::Stdio,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc, Mutex,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::Context as _;
use changeset::{Change, ChangeSet, FileStatus};
use git_cvs_import_store::Store;
use git_fast_import::{
    marks, Commit, CommitBuilder, FileCommand, FileMode, Mark, Parent, Writer,
};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    signal::unix::{signal, SignalKind},
    task,
};

use crate::{authors::AuthorMap, git::Git, progress::Progress};

const NOTES_REF: &str = "refs/notes/cvs";

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("git fast-import failed with {status}\n{stderr}")]
    SinkFailure { status: String, stderr: String },

    #[error("error spawning git fast-import: {0:?}")]
    Spawn(#[source] io::Error),

    #[error("cannot establish a {0} pipe to git fast-import")]
    Pipe(&'static str),
}

/// Lazy access to file content and permissions for a change. The exporter
/// is handed an implementation instead of the entities carrying a provider
/// back-pointer.
pub(crate) trait ChangeReader {
    /// The file content after the change, keyword-expanded as CVS would
    /// check it out.
    fn blob(&self, change: &Change) -> anyhow::Result<Vec<u8>>;

    /// Whether the RCS file has any execute bit set.
    fn executable(&self, change: &Change) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone)]
pub(crate) struct Options {
    pub target_ref: String,
    pub notes: bool,
    pub stop_on_unknown_author: bool,
}

#[derive(Debug)]
pub(crate) struct Outcome {
    pub exported: usize,
    /// The signal that stopped the export early, if any.
    pub signal: Option<i32>,
}

impl Outcome {
    pub(crate) fn exit_code(&self) -> i32 {
        match self.signal {
            Some(signal) => 128 + signal,
            None => 0,
        }
    }
}

/// Exports all unmarked changesets from the store.
pub(crate) async fn export(
    git: &Git,
    store: &Store,
    reader: &dyn ChangeReader,
    authors: &AuthorMap,
    options: &Options,
    progress: &mut dyn Progress,
) -> anyhow::Result<Outcome> {
    let changesets = store.unmarked_changesets_by_start_time()?;
    if changesets.is_empty() {
        log::info!("nothing to import");
        return Ok(Outcome {
            exported: 0,
            signal: None,
        });
    }

    // Unknown authors abort before anything is sent to the sink.
    if options.stop_on_unknown_author {
        authors.check_known(changesets.iter().map(|changeset| changeset.author()))?;
    }

    let signals = SignalWatcher::install()?;

    let marks_file = tempfile::Builder::new()
        .prefix("fast-import-marks.")
        .tempfile_in(git.git_dir())
        .context("cannot create the marks file")?;

    let mut sink = Sink::spawn(git, marks_file.path())?;
    let mut writer = Writer::new(sink.take_stdin()?);

    // The first commit of a fresh ref has no parent; the first commit of an
    // incremental run continues from the existing tip.
    let mut parent = if git.ref_exists(&options.target_ref)? {
        Some(Parent::Ref(options.target_ref.clone()))
    } else {
        None
    };
    let mut notes_parent = if options.notes && git.ref_exists(NOTES_REF)? {
        Some(Parent::Ref(NOTES_REF.into()))
    } else {
        None
    };

    let total = changesets.len();
    let mut emitted = Vec::new();
    let mut stopped_by = None;
    progress.update("Importing changesets", 0, total);

    for changeset in &changesets {
        // Cooperative cancellation: stop at the changeset boundary, then
        // still close the stream and record marks for what was committed.
        if let Some(number) = signals.pending() {
            log::warn!("received signal {}; stopping at changeset boundary", number);
            stopped_by = Some(number);
            break;
        }

        let id = changeset
            .id
            .ok_or_else(|| anyhow::anyhow!("stored changeset is missing its id"))?;
        let mark = Mark(id as u64);

        writer.commit(&build_commit(changeset, mark, parent.take(), authors, reader, options)?)?;

        if options.notes {
            writer.commit(&build_note_commit(changeset, mark, notes_parent.take(), authors)?)?;
        }

        parent = Some(Parent::Mark(mark));
        emitted.push(id);
        progress.update("Importing changesets", emitted.len(), total);
    }

    // Closing the stream makes the sink finish up and write its marks.
    writer.flush()?;
    drop(writer);
    sink.wait().await?;

    let marks_table = marks::parse(std::fs::File::open(marks_file.path())?)
        .context("cannot parse the marks the sink exported")?;

    store.begin()?;
    for id in &emitted {
        match marks_table.get(&Mark(*id as u64)) {
            Some(oid) => store.mark_changeset(*id, oid)?,
            None => log::warn!("the sink did not report a mark for changeset {}", id),
        }
    }
    store.commit()?;

    log::info!("imported {} changeset(s)", emitted.len());

    Ok(Outcome {
        exported: emitted.len(),
        signal: stopped_by,
    })
}

fn build_commit(
    changeset: &ChangeSet,
    mark: Mark,
    parent: Option<Parent>,
    authors: &AuthorMap,
    reader: &dyn ChangeReader,
    options: &Options,
) -> anyhow::Result<Commit> {
    let mut builder = CommitBuilder::new(options.target_ref.clone());
    builder
        .mark(mark)
        .committer(authors.identity(changeset.author(), changeset.effective_timestamp()))
        .message(changeset.log().as_bytes().to_vec());
    if let Some(parent) = parent {
        builder.parent(parent);
    }

    for change in sorted_changes(changeset) {
        match change.filestatus {
            FileStatus::Deleted => {
                builder.add_file_command(FileCommand::Delete {
                    path: change.filename.clone(),
                });
            }
            FileStatus::Added | FileStatus::Modified => {
                let data = reader
                    .blob(change)
                    .with_context(|| format!("cannot read {}:{}", change.filename, change.revision))?;
                let mode = if reader.executable(change)? {
                    FileMode::Executable
                } else {
                    FileMode::Normal
                };
                builder.add_file_command(FileCommand::Modify {
                    mode,
                    path: change.filename.clone(),
                    data,
                });
            }
        }
    }

    Ok(builder.build()?)
}

/// A companion commit on the notes ref recording which file revisions each
/// commit came from.
fn build_note_commit(
    changeset: &ChangeSet,
    target: Mark,
    parent: Option<Parent>,
    authors: &AuthorMap,
) -> anyhow::Result<Commit> {
    let mut data = Vec::new();
    for change in sorted_changes(changeset) {
        data.extend_from_slice(change.revision.as_bytes());
        data.push(b' ');
        data.extend_from_slice(change.filename.as_bytes());
        data.push(b'\n');
    }

    let mut builder = CommitBuilder::new(NOTES_REF.into());
    builder
        .committer(authors.identity(changeset.author(), changeset.effective_timestamp()))
        .message(b"Import provenance notes.\n".to_vec())
        .add_file_command(FileCommand::Note { target, data });
    if let Some(parent) = parent {
        builder.parent(parent);
    }

    Ok(builder.build()?)
}

/// Member changes sorted by filename for reproducible streams.
fn sorted_changes(changeset: &ChangeSet) -> Vec<&Change> {
    let mut changes: Vec<&Change> = changeset.changes().iter().collect();
    changes.sort_by(|a, b| a.filename.cmp(&b.filename));
    changes
}

/// Observes SIGHUP, SIGINT and SIGTERM. The first signal received is held
/// for the export loop to act on at the next changeset boundary.
#[derive(Debug, Clone)]
struct SignalWatcher {
    received: Arc<AtomicI32>,
}

impl SignalWatcher {
    fn install() -> io::Result<Self> {
        let received = Arc::new(AtomicI32::new(0));

        for (kind, number) in [
            (SignalKind::hangup(), libc::SIGHUP),
            (SignalKind::interrupt(), libc::SIGINT),
            (SignalKind::terminate(), libc::SIGTERM),
        ] {
            let mut stream = signal(kind)?;
            let received = Arc::clone(&received);
            task::spawn(async move {
                if stream.recv().await.is_some() {
                    let _ = received.compare_exchange(0, number, Ordering::SeqCst, Ordering::SeqCst);
                }
            });
        }

        Ok(Self { received })
    }

    fn pending(&self) -> Option<i32> {
        match self.received.load(Ordering::SeqCst) {
            0 => None,
            number => Some(number),
        }
    }
}

/// The `git fast-import` child process.
#[derive(Debug)]
struct Sink {
    child: std::process::Child,
    stderr: Arc<Mutex<Vec<String>>>,
}

impl Sink {
    fn spawn(git: &Git, marks_path: &Path) -> Result<Self, Error> {
        let mut command = git.command();
        command
            .arg("fast-import")
            .arg("--quiet")
            .arg(format!("--export-marks={}", marks_path.display()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // The sink must outlive a terminal Ctrl-C so the parent can close
        // the stream and read the marks back; it only ever stops because
        // its stdin reaches EOF.
        unsafe {
            use std::os::unix::process::CommandExt;
            command.pre_exec(|| {
                libc::signal(libc::SIGHUP, libc::SIG_IGN);
                libc::signal(libc::SIGINT, libc::SIG_IGN);
                libc::signal(libc::SIGTERM, libc::SIG_IGN);
                Ok(())
            });
        }

        let mut child = command.spawn().map_err(Error::Spawn)?;

        let stdout = child.stdout.take().ok_or(Error::Pipe("stdout"))?;
        let stdout = tokio::process::ChildStdout::from_std(stdout).map_err(Error::Spawn)?;
        task::spawn(log_pipe(stdout));

        let stderr_lines = Arc::new(Mutex::new(Vec::new()));
        let stderr = child.stderr.take().ok_or(Error::Pipe("stderr"))?;
        let stderr = tokio::process::ChildStderr::from_std(stderr).map_err(Error::Spawn)?;
        task::spawn(collect_stderr(stderr, Arc::clone(&stderr_lines)));

        Ok(Self {
            child,
            stderr: stderr_lines,
        })
    }

    fn take_stdin(&mut self) -> Result<std::process::ChildStdin, Error> {
        self.child.stdin.take().ok_or(Error::Pipe("stdin"))
    }

    async fn wait(self) -> Result<(), Error> {
        let Sink { mut child, stderr } = self;

        let status = task::spawn_blocking(move || child.wait())
            .await
            .map_err(|e| Error::Spawn(io::Error::new(io::ErrorKind::Other, e)))?
            .map_err(Error::Spawn)?;

        if status.success() {
            log::debug!("git fast-import exited cleanly");
            Ok(())
        } else {
            // Already-marked changesets stay valid; only this run is lost.
            Err(Error::SinkFailure {
                status: status.to_string(),
                stderr: stderr
                    .lock()
                    .map(|lines| lines.join("\n"))
                    .unwrap_or_default(),
            })
        }
    }
}

async fn log_pipe<R: AsyncRead + Unpin>(reader: R) -> io::Result<()> {
    let mut lines = BufReader::new(reader).split(b'\n');
    while let Some(line) = lines.next_segment().await? {
        log::debug!("git fast-import: {}", String::from_utf8_lossy(&line));
    }
    Ok(())
}

async fn collect_stderr<R: AsyncRead + Unpin>(
    reader: R,
    buffer: Arc<Mutex<Vec<String>>>,
) -> io::Result<()> {
    let mut lines = BufReader::new(reader).split(b'\n');
    while let Some(line) = lines.next_segment().await? {
        let line = String::from_utf8_lossy(&line).into_owned();
        log::info!("git fast-import: {}", &line);
        if let Ok(mut buffer) = buffer.lock() {
            buffer.push(line);
        }
    }
    Ok(())
}

/// The current wall-clock time as epoch seconds, for the quiet-period check
/// at the end of a run.
pub(crate) fn now() -> anyhow::Result<i64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before the epoch")?
        .as_secs() as i64)
}
