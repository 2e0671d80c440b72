use std::path::PathBuf;

use structopt::StructOpt;

use super::{fetch, init, ImportOpt};

/// Clone a CVS repository or module into a new Git repository.
#[derive(Debug, StructOpt)]
pub(crate) struct Clone {
    #[structopt(
        value_name = "REPOSITORY",
        parse(from_os_str),
        help = "local path to the CVS repository root or a module below it"
    )]
    repository: PathBuf,

    #[structopt(
        value_name = "DIRECTORY",
        parse(from_os_str),
        help = "destination directory; defaults to the module name"
    )]
    directory: Option<PathBuf>,

    #[structopt(
        long,
        help = "keep the incomplete Git repository on failure and continue from the last checkpoint if it already exists"
    )]
    incremental: bool,

    #[structopt(long, help = "create a bare repository")]
    bare: bool,

    #[structopt(flatten)]
    import: ImportOpt,
}

impl Clone {
    pub(crate) async fn run(self) -> anyhow::Result<i32> {
        let Clone {
            repository,
            directory,
            incremental,
            bare,
            import,
        } = self;

        let directory = directory.unwrap_or_else(|| init::default_directory(&repository));
        if directory.exists() && !incremental {
            anyhow::bail!(
                "destination path '{}' already exists",
                directory.display()
            );
        }

        let result = async {
            let git = init::init_repository(&repository, &directory, bare, import.domain.as_deref())?;
            let code = fetch::run_import(&git, &import).await?;

            if code == 0 && !bare {
                // Produce the initial checkout.
                git.reset_hard(&import.target_ref)?;
            }

            Ok::<i32, anyhow::Error>(code)
        }
        .await;

        // An unfinished clone is removed so it can be retried from scratch,
        // unless checkpoints were asked for.
        match result {
            Ok(0) => Ok(0),
            Ok(code) => {
                cleanup(&directory, incremental);
                Ok(code)
            }
            Err(e) => {
                cleanup(&directory, incremental);
                Err(e)
            }
        }
    }
}

fn cleanup(directory: &std::path::Path, incremental: bool) {
    if incremental {
        log::info!(
            "keeping incomplete clone at {}; re-run with --incremental to continue",
            directory.display()
        );
        return;
    }

    log::warn!("removing incomplete clone at {}", directory.display());
    if let Err(e) = std::fs::remove_dir_all(directory) {
        log::error!("cannot remove {}: {}", directory.display(), e);
    }
}
