use std::path::Path;

use structopt::StructOpt;

use crate::git::Git;

use super::{fetch, ImportOpt};

/// Import new CVS changes and fast-forward the current branch.
#[derive(Debug, StructOpt)]
pub(crate) struct Pull {
    #[structopt(flatten)]
    import: ImportOpt,
}

impl Pull {
    pub(crate) async fn run(self) -> anyhow::Result<i32> {
        let git = Git::open(Path::new("."))?;
        let code = fetch::run_import(&git, &self.import).await?;

        if code == 0 {
            git.merge_ff(&self.import.target_ref)?;
        } else {
            log::warn!("skipping merge after interrupted import");
        }

        Ok(code)
    }
}
