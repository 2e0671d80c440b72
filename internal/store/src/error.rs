use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Migration(#[from] refinery::Error),

    #[error(transparent)]
    Corrupt(#[from] changeset::Error),

    #[error("change {filename}:{revision} is not in the store")]
    UnknownChange { filename: String, revision: String },

    #[error("changeset {id} is not in the store")]
    UnknownChangeSet { id: i64 },
}
