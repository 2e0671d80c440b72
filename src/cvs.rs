//! The CVS repository model: CVSROOT discovery, the module prefix, and lazy
//! access to file content for the exporter.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use changeset::Change;
use thiserror::Error;

use crate::export::ChangeReader;

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("not a CVS repository path (no CVSROOT within or above): {}", .path.display())]
    NotARepository { path: PathBuf },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A local CVS repository, confined to one module.
#[derive(Debug, Clone)]
pub(crate) struct Repository {
    root: PathBuf,
    module: String,
    prefix: PathBuf,
    local_id: Option<String>,
}

impl Repository {
    /// Opens the repository at or above `dirname`.
    ///
    /// The repository root is found by walking upwards until a directory
    /// containing `CVSROOT` appears; the path below it is the module, and
    /// all operations are confined to the module prefix.
    pub(crate) fn open(dirname: &Path) -> Result<Self, Error> {
        let dirname = dirname.canonicalize().map_err(|source| Error::Io {
            path: dirname.to_path_buf(),
            source,
        })?;

        let mut root = dirname.clone();
        let mut components = Vec::new();
        loop {
            if root.join("CVSROOT").is_dir() {
                break;
            }
            match (root.parent(), root.file_name()) {
                (Some(parent), Some(name)) => {
                    components.push(name.to_string_lossy().into_owned());
                    root = parent.to_path_buf();
                }
                _ => return Err(Error::NotARepository { path: dirname }),
            }
        }
        components.reverse();
        let module = components.join("/");

        let prefix = if module.is_empty() {
            root.clone()
        } else {
            root.join(&module)
        };

        let local_id = read_local_id(&root.join("CVSROOT").join("options"))?;
        if let Some(tag) = &local_id {
            log::debug!("repository defines local keyword {:?}", tag);
        }

        let repository = Self {
            root,
            module,
            prefix,
            local_id,
        };
        log::debug!(
            "CVS repository root {}, module {:?}",
            repository.root.display(),
            repository.module
        );

        Ok(repository)
    }

    pub(crate) fn module(&self) -> &str {
        &self.module
    }

    /// Absolute path of the module: the subtree the scanner walks.
    pub(crate) fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub(crate) fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    /// Locates the RCS file backing a working-copy filename, looking in the
    /// live directory first and the Attic second.
    pub(crate) fn rcs_path(&self, filename: &str) -> Option<PathBuf> {
        let live = self.prefix.join(format!("{},v", filename));
        if live.is_file() {
            return Some(live);
        }

        let path = Path::new(filename);
        let attic = self
            .prefix
            .join(path.parent().unwrap_or_else(|| Path::new("")))
            .join("Attic")
            .join(format!("{},v", path.file_name()?.to_string_lossy()));
        if attic.is_file() {
            Some(attic)
        } else {
            None
        }
    }

    fn parse_rcs_file(&self, change: &Change) -> anyhow::Result<(PathBuf, rcs::File)> {
        let path = self
            .rcs_path(&change.filename)
            .with_context(|| format!("no RCS file found for {}", change.filename))?;
        let data =
            fs::read(&path).with_context(|| format!("cannot read {}", path.display()))?;
        let file = rcs::parse(&data)
            .with_context(|| format!("cannot parse {}", path.display()))?;

        Ok((path, file))
    }
}

impl ChangeReader for Repository {
    fn blob(&self, change: &Change) -> anyhow::Result<Vec<u8>> {
        let (path, file) = self.parse_rcs_file(change)?;

        let revision: rcs::Num = change.revision.parse()?;
        let data = file
            .checkout(&revision)
            .with_context(|| format!("in {}", path.display()))?;

        if !rcs::keyword::active(file.admin.expand.as_deref(), &change.mode) {
            return Ok(data);
        }

        let rcs_path = path.to_string_lossy();
        let context = rcs::keyword::Context {
            rcs_path: &rcs_path,
            revision: &change.revision,
            timestamp: change.timestamp,
            author: &change.author,
            state: &change.state,
            log: &change.log,
            local_id: self.local_id(),
        };
        Ok(rcs::keyword::expand(&data, &context))
    }

    fn executable(&self, change: &Change) -> anyhow::Result<bool> {
        use std::os::unix::fs::MetadataExt;

        let path = self
            .rcs_path(&change.filename)
            .with_context(|| format!("no RCS file found for {}", change.filename))?;
        let metadata =
            fs::metadata(&path).with_context(|| format!("cannot stat {}", path.display()))?;

        Ok(metadata.mode() & 0o111 != 0)
    }
}

fn read_local_id(options: &Path) -> Result<Option<String>, Error> {
    let content = match fs::read_to_string(options) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(Error::Io {
                path: options.to_path_buf(),
                source,
            })
        }
    };

    // CVSROOT/options is line-oriented; tag=NAME configures the local
    // expansion keyword.
    for line in content.lines() {
        if let Some(value) = line.trim().strip_prefix("tag=") {
            let value = value.trim();
            if !value.is_empty() {
                return Ok(Some(value.into()));
            }
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_repository(tag: Option<&str>) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("CVSROOT")).unwrap();
        fs::create_dir_all(dir.path().join("src/lib")).unwrap();
        if let Some(tag) = tag {
            fs::write(
                dir.path().join("CVSROOT/options"),
                format!("# options\ntag={}\n", tag),
            )
            .unwrap();
        }
        dir
    }

    #[test]
    fn test_open_at_root() {
        let dir = fake_repository(None);
        let repository = Repository::open(dir.path()).unwrap();

        assert_eq!(repository.module(), "");
        assert_eq!(repository.prefix(), dir.path().canonicalize().unwrap());
        assert!(repository.local_id().is_none());
    }

    #[test]
    fn test_open_below_root() {
        let dir = fake_repository(Some("Widget"));
        let repository = Repository::open(&dir.path().join("src/lib")).unwrap();

        assert_eq!(repository.module(), "src/lib");
        assert_eq!(
            repository.prefix(),
            dir.path().canonicalize().unwrap().join("src/lib")
        );
        assert_eq!(repository.local_id(), Some("Widget"));
    }

    #[test]
    fn test_open_outside_repository() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Repository::open(dir.path()),
            Err(Error::NotARepository { .. })
        ));
    }

    #[test]
    fn test_rcs_path_prefers_live_over_attic() {
        let dir = fake_repository(None);
        let repository = Repository::open(&dir.path().join("src")).unwrap();

        let prefix = repository.prefix().to_path_buf();
        fs::create_dir_all(prefix.join("lib/Attic")).unwrap();
        fs::write(prefix.join("lib/gone.c,v"), b"x").unwrap();
        fs::write(prefix.join("lib/Attic/gone.c,v"), b"x").unwrap();
        fs::write(prefix.join("lib/Attic/dead.c,v"), b"x").unwrap();

        assert_eq!(
            repository.rcs_path("lib/gone.c").unwrap(),
            prefix.join("lib/gone.c,v")
        );
        assert_eq!(
            repository.rcs_path("lib/dead.c").unwrap(),
            prefix.join("lib/Attic/dead.c,v")
        );
        assert!(repository.rcs_path("lib/missing.c").is_none());
    }
}
