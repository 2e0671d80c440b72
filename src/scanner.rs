//! RCS file discovery and ingest.
//!
//! The scanner walks the module prefix, resolves Attic zombies, skips files
//! the stat cache proves unchanged, and parses the rest into change records
//! in the metadata store. Stat cache rows are written in the same
//! transaction as the changes they cover, so an interrupted scan never
//! claims a file it did not finish.

use std::{
    collections::{btree_map, BTreeMap},
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::Context as _;
use changeset::{Change, FileStatus};
use git_cvs_import_store::Store;
use thiserror::Error;
use walkdir::WalkDir;

use crate::{cvs::Repository, progress::Progress};

/// How often the ingest loop commits, so an interruption never forces a
/// full rescan.
const COMMIT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error(
        "{} exists both live and in the Attic with equal sizes; resolve manually",
        .filename
    )]
    ZombieAmbiguous { filename: String },

    #[error(transparent)]
    Walk(#[from] walkdir::Error),
}

/// An RCS file found by the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RcsCandidate {
    /// Absolute path of the ",v" file.
    pub path: PathBuf,
    /// Path relative to the module prefix; the stat cache key.
    pub relpath: String,
    /// Working-copy filename, with Attic and the ",v" suffix stripped.
    pub filename: String,
    pub mtime: i64,
    pub size: u64,
}

/// Walks the module prefix and returns one candidate per working-copy
/// filename, zombies resolved, in deterministic order.
pub(crate) fn collect(prefix: &Path) -> Result<Vec<RcsCandidate>, Error> {
    let mut candidates = BTreeMap::new();

    for entry in WalkDir::new(prefix) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !path
            .file_name()
            .map(|name| name.to_string_lossy().ends_with(",v"))
            .unwrap_or(false)
        {
            continue;
        }

        let metadata = entry.metadata()?;
        let relpath = path.strip_prefix(prefix).unwrap_or(path);

        let candidate = RcsCandidate {
            path: path.to_path_buf(),
            relpath: relpath.to_string_lossy().into_owned(),
            filename: munge_path(relpath).to_string_lossy().into_owned(),
            mtime: mtime_of(&metadata),
            size: metadata.len(),
        };
        add_candidate(&mut candidates, candidate)?;
    }

    Ok(candidates.into_iter().map(|(_, candidate)| candidate).collect())
}

/// The zombie check. A file can exist both live and in the Attic when a CVS
/// mirror removed it in one place without removing the other; the copy with
/// more history (the larger one) wins. Equal sizes leave no way to decide.
fn add_candidate(
    candidates: &mut BTreeMap<String, RcsCandidate>,
    candidate: RcsCandidate,
) -> Result<(), Error> {
    match candidates.entry(candidate.filename.clone()) {
        btree_map::Entry::Vacant(slot) => {
            slot.insert(candidate);
        }
        btree_map::Entry::Occupied(mut slot) => {
            let existing = slot.get();
            if existing.size == candidate.size {
                return Err(Error::ZombieAmbiguous {
                    filename: candidate.filename,
                });
            }
            if candidate.size > existing.size {
                log::warn!(
                    "zombie: using {} and dropping {}",
                    candidate.relpath,
                    existing.relpath
                );
                slot.insert(candidate);
            } else {
                log::warn!(
                    "zombie: using {} and dropping {}",
                    existing.relpath,
                    candidate.relpath
                );
            }
        }
    }

    Ok(())
}

/// Keeps only candidates whose (mtime, size) differ from the stat cache.
pub(crate) fn changed(
    candidates: Vec<RcsCandidate>,
    statcache: &std::collections::HashMap<String, (i64, u64)>,
) -> Vec<RcsCandidate> {
    candidates
        .into_iter()
        .filter(|candidate| {
            statcache.get(&candidate.relpath) != Some(&(candidate.mtime, candidate.size))
        })
        .collect()
}

/// Scans the repository and inserts the changes of every new or modified
/// RCS file into the store.
pub(crate) fn ingest(
    repository: &Repository,
    store: &Store,
    progress: &mut dyn Progress,
) -> anyhow::Result<()> {
    let statcache = store.load_statcache()?;
    let all = collect(repository.prefix())?;
    log::info!("Collecting RCS files: {}", all.len());

    let todo = changed(all, &statcache);
    let total = todo.len();
    progress.update("Parsing RCS files", 0, total);

    store.begin()?;
    let mut pending_statcache = Vec::new();
    let mut last_commit = Instant::now();

    for (index, candidate) in todo.into_iter().enumerate() {
        if let Err(e) = ingest_file(&candidate, store) {
            // Surface the offending file, then re-raise so the user can
            // repair or remove it. The open batch is rolled back; files
            // committed in earlier batches are not rescanned.
            log::error!("error processing {}: {:#}", candidate.path.display(), e);
            store.rollback()?;
            return Err(e);
        }

        pending_statcache.push((candidate.relpath, (candidate.mtime, candidate.size)));
        if last_commit.elapsed() >= COMMIT_INTERVAL {
            store.update_statcache(pending_statcache.drain(..))?;
            store.commit()?;
            store.begin()?;
            last_commit = Instant::now();
        }

        progress.update("Parsing RCS files", index + 1, total);
    }

    store.update_statcache(pending_statcache.drain(..))?;
    store.commit()?;

    Ok(())
}

fn ingest_file(candidate: &RcsCandidate, store: &Store) -> anyhow::Result<()> {
    let data = fs::read(&candidate.path)
        .with_context(|| format!("cannot read {}", candidate.path.display()))?;
    let file = rcs::parse(&data)
        .with_context(|| format!("cannot parse {}", candidate.path.display()))?;

    let mode = if file.is_binary() { "b" } else { "" };

    for revision in file.main_line()? {
        store.add_change(&Change {
            timestamp: revision.date,
            author: latin1(revision.author),
            log: latin1(revision.log),
            filestatus: match revision.status {
                rcs::RevisionStatus::Added => FileStatus::Added,
                rcs::RevisionStatus::Modified => FileStatus::Modified,
                rcs::RevisionStatus::Dead => FileStatus::Deleted,
            },
            filename: candidate.filename.clone(),
            revision: revision.num.to_string(),
            state: latin1(revision.state),
            mode: mode.into(),
        })?;
    }

    Ok(())
}

/// RCS has no declared encoding; logs and authors are treated as Latin-1
/// and re-encoded as UTF-8.
fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Strips the ",v" suffix and a final Attic directory from a repository
/// path, yielding the working-copy filename.
fn munge_path(relpath: &Path) -> PathBuf {
    let file = match relpath.file_name() {
        Some(name) => {
            let name = name.to_string_lossy();
            name.strip_suffix(",v").unwrap_or(&name).to_string()
        }
        None => return relpath.to_path_buf(),
    };

    match relpath.parent() {
        Some(parent) if parent.file_name() == Some(OsStr::new("Attic")) => parent
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(file),
        Some(parent) => parent.join(file),
        None => PathBuf::from(file),
    }
}

fn mtime_of(metadata: &fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    metadata.mtime()
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! assert_munge {
        ($input:expr, $want:expr) => {
            assert_eq!(munge_path(Path::new($input)), PathBuf::from($want));
        };
    }

    #[test]
    fn test_munge_path() {
        assert_munge!("foo,v", "foo");
        assert_munge!("foo", "foo");
        assert_munge!("dir/foo,v", "dir/foo");
        assert_munge!("dir/Attic/foo,v", "dir/foo");
        assert_munge!("Attic/foo,v", "foo");

        // Attic only counts as the last directory.
        assert_munge!("Attic/dir/foo,v", "Attic/dir/foo");
        assert_munge!("dir/Attic/Attic/foo,v", "dir/Attic/foo");
    }

    fn candidate(relpath: &str, size: u64) -> RcsCandidate {
        RcsCandidate {
            path: PathBuf::from("/cvs").join(relpath),
            relpath: relpath.into(),
            filename: munge_path(Path::new(relpath)).to_string_lossy().into_owned(),
            mtime: 1000,
            size,
        }
    }

    #[test]
    fn test_zombie_prefers_larger_attic_copy() {
        let mut candidates = BTreeMap::new();
        add_candidate(&mut candidates, candidate("foo/bar,v", 800)).unwrap();
        add_candidate(&mut candidates, candidate("foo/Attic/bar,v", 1200)).unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates["foo/bar"].relpath, "foo/Attic/bar,v");
    }

    #[test]
    fn test_zombie_prefers_larger_live_copy() {
        let mut candidates = BTreeMap::new();
        add_candidate(&mut candidates, candidate("foo/Attic/bar,v", 700)).unwrap();
        add_candidate(&mut candidates, candidate("foo/bar,v", 900)).unwrap();

        assert_eq!(candidates["foo/bar"].relpath, "foo/bar,v");
    }

    #[test]
    fn test_zombie_equal_sizes_is_ambiguous() {
        let mut candidates = BTreeMap::new();
        add_candidate(&mut candidates, candidate("foo/bar,v", 800)).unwrap();

        assert!(matches!(
            add_candidate(&mut candidates, candidate("foo/Attic/bar,v", 800)),
            Err(Error::ZombieAmbiguous { .. })
        ));
    }

    #[test]
    fn test_changed_against_statcache() {
        let statcache = vec![
            ("same,v".to_string(), (1000, 800)),
            ("touched,v".to_string(), (900, 800)),
        ]
        .into_iter()
        .collect();

        let picked = changed(
            vec![candidate("same,v", 800), candidate("touched,v", 800), candidate("new,v", 10)],
            &statcache,
        );

        let names: Vec<&str> = picked.iter().map(|c| c.relpath.as_str()).collect();
        assert_eq!(names, vec!["touched,v", "new,v"]);
    }

    #[test]
    fn test_collect_walks_only_rcs_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lib/Attic")).unwrap();
        fs::write(dir.path().join("lib/a.c,v"), b"a").unwrap();
        fs::write(dir.path().join("lib/Attic/b.c,v"), b"bb").unwrap();
        fs::write(dir.path().join("lib/README"), b"not rcs").unwrap();

        let candidates = collect(dir.path()).unwrap();
        let names: Vec<&str> = candidates.iter().map(|c| c.filename.as_str()).collect();

        assert_eq!(names, vec!["lib/a.c", "lib/b.c"]);
        assert_eq!(candidates[1].relpath, "lib/Attic/b.c,v");
        assert_eq!(candidates[1].size, 2);
    }

    #[test]
    fn test_latin1() {
        assert_eq!(latin1(b"plain"), "plain");
        // 0xE9 is é in Latin-1.
        assert_eq!(latin1(b"caf\xe9"), "café");
    }

    #[test]
    fn test_ingest_is_idempotent() {
        use crate::progress::NullProgress;

        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("CVSROOT")).unwrap();
        fs::create_dir(dir.path().join("module")).unwrap();
        fs::write(
            dir.path().join("module/hello.c,v"),
            &include_bytes!("../rcs/src/fixtures/hello.c,v")[..],
        )
        .unwrap();

        let repository = Repository::open(&dir.path().join("module")).unwrap();
        let store = Store::open_in_memory().unwrap();
        let mut progress = NullProgress;

        ingest(&repository, &store, &mut progress).unwrap();
        assert_eq!(store.count_free_changes().unwrap(), 2);

        // Nothing changed on disk: the stat cache skips the file, and even
        // a forced re-parse could not duplicate changes.
        ingest(&repository, &store, &mut progress).unwrap();
        assert_eq!(store.count_free_changes().unwrap(), 2);
    }
}
