use std::path::{Path, PathBuf};

use structopt::StructOpt;

use crate::{cvs::Repository, git::Git};

/// Initialise a Git repository that tracks a CVS repository.
#[derive(Debug, StructOpt)]
pub(crate) struct Init {
    #[structopt(
        value_name = "REPOSITORY",
        parse(from_os_str),
        help = "local path to the CVS repository root or a module below it"
    )]
    repository: PathBuf,

    #[structopt(
        value_name = "DIRECTORY",
        parse(from_os_str),
        help = "directory for the new Git repository; defaults to the module name"
    )]
    directory: Option<PathBuf>,

    #[structopt(long, help = "create a bare repository")]
    bare: bool,

    #[structopt(
        long,
        value_name = "DOMAIN",
        help = "e-mail domain recorded for authors without a mapping"
    )]
    domain: Option<String>,
}

impl Init {
    pub(crate) async fn run(self) -> anyhow::Result<i32> {
        let directory = match self.directory {
            Some(directory) => directory,
            None => default_directory(&self.repository),
        };
        init_repository(&self.repository, &directory, self.bare, self.domain.as_deref())?;
        Ok(0)
    }
}

/// Creates the Git repository and records the CVS source in its config.
pub(crate) fn init_repository(
    repository: &Path,
    directory: &Path,
    bare: bool,
    domain: Option<&str>,
) -> anyhow::Result<Git> {
    // Validate the CVS path before creating anything on disk.
    let cvs = Repository::open(repository)?;
    log::info!(
        "tracking CVS module {:?} at {}",
        cvs.module(),
        cvs.prefix().display()
    );

    let git = Git::init(directory, bare)?;
    git.config_set("cvs.source", &cvs.prefix().to_string_lossy())?;
    if let Some(domain) = domain {
        git.config_set("cvs.domain", domain)?;
    }

    Ok(git)
}

/// The destination directory implied by the repository path: its last
/// component.
pub(crate) fn default_directory(repository: &Path) -> PathBuf {
    repository
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
