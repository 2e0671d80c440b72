use nom::error::ErrorKind;
use thiserror::Error;

use crate::edit;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed revision number: {0:?}")]
    BadNum(String),

    #[error("cannot reconstruct revision {revision}")]
    Checkout { revision: String },

    #[error("error applying the delta for revision {revision}: {source}")]
    Edit {
        revision: String,
        #[source]
        source: edit::Error,
    },

    #[error("revision {revision} is referenced but not defined")]
    MissingRevision { revision: String },

    #[error("parse error of kind {kind:?} near {location:?}")]
    Parse { location: String, kind: ErrorKind },
}

impl Error {
    pub(crate) fn missing(revision: &crate::Num) -> Self {
        Self::MissingRevision {
            revision: revision.to_string(),
        }
    }
}
