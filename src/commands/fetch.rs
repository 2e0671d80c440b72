use std::path::Path;

use anyhow::Context as _;
use changeset::ChangeSetGenerator;
use git_cvs_import_store::Store;
use structopt::StructOpt;

use crate::{
    authors::AuthorMap,
    cvs::Repository,
    export,
    git::Git,
    progress::{LogProgress, NullProgress, Progress},
    scanner,
};

use super::ImportOpt;

/// Import new CVS changes onto the tracking ref.
#[derive(Debug, StructOpt)]
pub(crate) struct Fetch {
    #[structopt(flatten)]
    import: ImportOpt,
}

impl Fetch {
    pub(crate) async fn run(self) -> anyhow::Result<i32> {
        let git = Git::open(Path::new("."))?;
        run_import(&git, &self.import).await
    }
}

/// The scan → group → export pipeline shared by clone, fetch and pull.
/// Returns the process exit code: 0, or 128 + N when signal N stopped the
/// export.
pub(crate) async fn run_import(git: &Git, opt: &ImportOpt) -> anyhow::Result<i32> {
    let source = git
        .config_get("cvs.source")?
        .context("missing cvs.source in the Git config; run init or clone first")?;
    let repository = Repository::open(Path::new(&source))?;
    let store = Store::open(git.git_dir().join("git-cvs-import.db"))?;

    let mut progress: Box<dyn Progress> = if log::log_enabled!(log::Level::Info) {
        Box::new(LogProgress::new())
    } else {
        Box::new(NullProgress)
    };

    scanner::ingest(&repository, &store, progress.as_mut())?;
    generate(&store, opt, progress.as_mut())?;

    let domain = match &opt.domain {
        Some(domain) => Some(domain.clone()),
        None => git.config_get("cvs.domain")?,
    };
    let authors = match &opt.authors {
        Some(path) => AuthorMap::load(path, domain)?,
        None => AuthorMap::new(domain),
    };

    let outcome = export::export(
        git,
        &store,
        &repository,
        &authors,
        &export::Options {
            target_ref: opt.target_ref.clone(),
            notes: opt.notes,
            stop_on_unknown_author: opt.stop_on_unknown_author,
        },
        progress.as_mut(),
    )
    .await?;

    Ok(outcome.exit_code())
}

/// Groups the free changes into changesets and inserts them durably.
///
/// The generator is a pure function of the free changes, so an interrupted
/// run loses nothing: whatever was not grouped stays free and is re-grouped
/// next time.
fn generate(store: &Store, opt: &ImportOpt, progress: &mut dyn Progress) -> anyhow::Result<usize> {
    let quiet_period = opt.quiet_period.as_secs() as i64;
    let mut generator = ChangeSetGenerator::new(quiet_period);
    let limit = opt.limit.unwrap_or(usize::MAX);
    let mut inserted = 0;

    let free = store.changes_by_timestamp(Some(false))?;
    let total = free.len();
    progress.update("Processing changes", 0, total);

    store.begin()?;
    let mut processed = 0;
    'changes: for change in free {
        processed += 1;
        for mut changeset in generator.integrate(change?) {
            store.add_changeset(&mut changeset)?;
            inserted += 1;
            if inserted >= limit {
                break 'changes;
            }
        }
        progress.update("Processing changes", processed, total);
    }

    if inserted < limit {
        // Changesets still inside the quiet period relative to now may be
        // half-synced commits; by default they wait for the next pull.
        let finished = if opt.no_skip_latest {
            generator.flush()
        } else {
            generator.flush_quiescent(export::now()?)
        };

        for mut changeset in finished {
            store.add_changeset(&mut changeset)?;
            inserted += 1;
            if inserted >= limit {
                break;
            }
        }
    }
    store.commit()?;

    progress.update("Processing changes", total, total);
    log::info!("{} new changeset(s)", inserted);

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use std::{fs, time::Duration};

    use super::*;
    use crate::progress::NullProgress;

    fn import_opt() -> ImportOpt {
        ImportOpt {
            quiet_period: Duration::from_secs(60),
            limit: None,
            authors: None,
            stop_on_unknown_author: false,
            domain: None,
            no_skip_latest: true,
            notes: false,
            target_ref: "refs/cvs/HEAD".into(),
        }
    }

    fn ingested_store() -> Store {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("CVSROOT")).unwrap();
        fs::create_dir(dir.path().join("module")).unwrap();
        fs::write(
            dir.path().join("module/hello.c,v"),
            &include_bytes!("../../rcs/src/fixtures/hello.c,v")[..],
        )
        .unwrap();

        let repository = Repository::open(&dir.path().join("module")).unwrap();
        let store = Store::open_in_memory().unwrap();
        scanner::ingest(&repository, &store, &mut NullProgress).unwrap();
        store
    }

    #[test]
    fn test_generate_groups_free_changes() {
        let store = ingested_store();
        assert_eq!(store.count_free_changes().unwrap(), 2);

        // The two revisions have different logs and lie a day apart, so
        // they become two changesets.
        let inserted = generate(&store, &import_opt(), &mut NullProgress).unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.count_free_changes().unwrap(), 0);

        let pending = store.unmarked_changesets_by_start_time().unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].start_time < pending[1].start_time);
        assert_eq!(pending[0].changes()[0].revision, "1.1");
        assert_eq!(pending[1].changes()[0].revision, "1.2");

        // Grouping is a pure function of the free changes: with none left,
        // re-running inserts nothing.
        let inserted = generate(&store, &import_opt(), &mut NullProgress).unwrap();
        assert_eq!(inserted, 0);
        assert_eq!(store.unmarked_changesets_by_start_time().unwrap().len(), 2);
    }

    #[test]
    fn test_generate_respects_limit() {
        let store = ingested_store();

        let mut opt = import_opt();
        opt.limit = Some(1);
        assert_eq!(generate(&store, &opt, &mut NullProgress).unwrap(), 1);

        // The remaining change stays free for the next run.
        assert_eq!(store.count_free_changes().unwrap(), 1);
        assert_eq!(generate(&store, &opt, &mut NullProgress).unwrap(), 1);
        assert_eq!(store.count_free_changes().unwrap(), 0);
    }
}
