//! Durable metadata store for `git-cvs-import`.
//!
//! A single embedded SQLite database holds everything the importer needs to
//! be incremental and crash-safe: the stat cache over RCS files, the pending
//! and grouped changes, the changesets, and the marks handed back by the
//! fast-import sink. After an interruption the next run simply redoes the
//! step that was cut short: re-parsing is idempotent on `(filename,
//! revision)`, grouping is a pure function of the free changes, and only
//! changesets without marks are exported again.

use std::{
    collections::{HashMap, VecDeque},
    path::Path,
};

use changeset::{Change, ChangeSet};
use rusqlite::params;

mod embedded {
    refinery::embed_migrations!("./src/migrations");
}

mod error;
pub use error::Error;

#[derive(Debug)]
pub struct Store {
    conn: rusqlite::Connection,
}

impl Store {
    /// Opens (and, if needed, migrates) the store at `path`.
    pub fn open<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        Self::new(rusqlite::Connection::open(path)?)
    }

    /// An in-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, Error> {
        Self::new(rusqlite::Connection::open_in_memory()?)
    }

    fn new(mut conn: rusqlite::Connection) -> Result<Self, Error> {
        embedded::migrations::runner().run(&mut conn)?;
        Ok(Self { conn })
    }

    /// Opens a transaction unless one is already active. The ingest loop
    /// batches many inserts per transaction and commits at natural
    /// boundaries.
    pub fn begin(&self) -> Result<(), Error> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    pub fn commit(&self) -> Result<(), Error> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    pub fn rollback(&self) -> Result<(), Error> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    /// Loads the complete stat cache as a path → (mtime, size) map.
    pub fn load_statcache(&self) -> Result<HashMap<String, (i64, u64)>, Error> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT path, mtime, size FROM statcache")?;

        let mut statcache = HashMap::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            statcache.insert(row.get(0)?, (row.get(1)?, row.get(2)?));
        }

        Ok(statcache)
    }

    /// Upserts stat cache entries. Called only once the corresponding files'
    /// changes have been durably inserted, never by the scanner itself.
    pub fn update_statcache<I>(&self, entries: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (String, (i64, u64))>,
    {
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO statcache (path, mtime, size) VALUES (?, ?, ?)",
        )?;
        for (path, (mtime, size)) in entries {
            stmt.execute(params![path, mtime, size])?;
        }

        Ok(())
    }

    /// Inserts a single change. Re-inserting an already ingested `(filename,
    /// revision)` pair is a no-op, which makes re-parsing a file idempotent.
    pub fn add_change(&self, change: &Change) -> Result<(), Error> {
        self.conn
            .prepare_cached(
                "INSERT OR IGNORE INTO change
                 (filename, revision, timestamp, author, log, filestatus, state, mode)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )?
            .execute(params![
                change.filename,
                change.revision,
                change.timestamp,
                change.author,
                change.log,
                change.filestatus.as_str(),
                change.state,
                change.mode,
            ])?;

        Ok(())
    }

    /// Inserts a changeset and attaches its member changes to it.
    ///
    /// The id allocation and the attachments are one unit: a crash leaves
    /// either all members pointing at the new changeset or the insert rolled
    /// back entirely. Sets `changeset.id` on success.
    pub fn add_changeset(&self, changeset: &mut ChangeSet) -> Result<i64, Error> {
        self.conn.execute_batch("SAVEPOINT add_changeset")?;

        match self.insert_changeset_rows(changeset) {
            Ok(id) => {
                self.conn.execute_batch("RELEASE add_changeset")?;
                changeset.id = Some(id);
                Ok(id)
            }
            Err(e) => {
                self.conn
                    .execute_batch("ROLLBACK TO add_changeset; RELEASE add_changeset")?;
                Err(e)
            }
        }
    }

    fn insert_changeset_rows(&self, changeset: &ChangeSet) -> Result<i64, Error> {
        self.conn
            .prepare_cached("INSERT INTO changeset (start_time, end_time) VALUES (?, ?)")?
            .execute(params![changeset.start_time, changeset.end_time])?;
        let id = self.conn.last_insert_rowid();

        let mut stmt = self.conn.prepare_cached(
            "UPDATE change SET changeset_id = ? WHERE filename = ? AND revision = ?",
        )?;
        for change in changeset.changes() {
            let updated = stmt.execute(params![id, change.filename, change.revision])?;
            if updated != 1 {
                return Err(Error::UnknownChange {
                    filename: change.filename.clone(),
                    revision: change.revision.clone(),
                });
            }
        }

        Ok(id)
    }

    /// Records the sink's identifier for an integrated changeset.
    pub fn mark_changeset(&self, id: i64, mark: &str) -> Result<(), Error> {
        let updated = self
            .conn
            .prepare_cached("UPDATE changeset SET mark = ? WHERE id = ?")?
            .execute(params![mark, id])?;

        if updated == 1 {
            Ok(())
        } else {
            Err(Error::UnknownChangeSet { id })
        }
    }

    /// Number of changes not yet bound into a changeset.
    pub fn count_free_changes(&self) -> Result<u64, Error> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM change WHERE changeset_id IS NULL",
            [],
            |row| row.get::<_, i64>(0),
        )? as u64)
    }

    /// Number of changesets not yet integrated into the target repository.
    pub fn count_unmarked_changesets(&self) -> Result<u64, Error> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM changeset WHERE mark IS NULL",
            [],
            |row| row.get::<_, i64>(0),
        )? as u64)
    }

    /// The stored changes in timestamp order. `processed` selects changes
    /// already bound into a changeset (`Some(true)`), free ones
    /// (`Some(false)`), or all of them (`None`).
    ///
    /// The candidate keys are snapshotted up front and each row is fetched
    /// through a short-lived query as the iterator is drained, so the
    /// changeset generator may attach changes to changesets mid-iteration;
    /// every change matching the filter at the start of the iteration is
    /// yielded exactly once.
    pub fn changes_by_timestamp(&self, processed: Option<bool>) -> Result<Changes<'_>, Error> {
        let condition = match processed {
            Some(true) => "changeset_id IS NOT NULL",
            Some(false) => "changeset_id IS NULL",
            None => "1",
        };

        let mut stmt = self.conn.prepare(&format!(
            "SELECT filename, revision FROM change
             WHERE {}
             ORDER BY timestamp, filename, revision",
            condition
        ))?;

        let mut keys = VecDeque::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            keys.push_back((row.get(0)?, row.get(1)?));
        }

        Ok(Changes { store: self, keys })
    }

    /// All changesets without a mark, ordered by `(start_time, id)` and
    /// hydrated with their member changes.
    pub fn unmarked_changesets_by_start_time(&self) -> Result<Vec<ChangeSet>, Error> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT cs.id, cs.start_time, cs.end_time,
                    c.timestamp, c.author, c.log, c.filestatus,
                    c.filename, c.revision, c.state, c.mode
             FROM changeset cs
             INNER JOIN change c ON c.changeset_id = cs.id
             WHERE cs.mark IS NULL
             ORDER BY cs.start_time, cs.id",
        )?;

        let mut changesets: Vec<ChangeSet> = Vec::new();
        let mut current: Option<(i64, i64, i64, Vec<Change>)> = None;

        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let change = change_from_row(row, 3)?;

            match &mut current {
                Some((current_id, _, _, changes)) if *current_id == id => {
                    changes.push(change);
                }
                _ => {
                    if let Some((id, start, end, changes)) = current.take() {
                        changesets.push(ChangeSet::from_parts(id, start, end, None, changes));
                    }
                    current = Some((id, row.get(1)?, row.get(2)?, vec![change]));
                }
            }
        }

        if let Some((id, start, end, changes)) = current.take() {
            changesets.push(ChangeSet::from_parts(id, start, end, None, changes));
        }

        Ok(changesets)
    }

    fn change_by_key(&self, filename: &str, revision: &str) -> Result<Option<Change>, Error> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT timestamp, author, log, filestatus, filename, revision, state, mode
             FROM change WHERE filename = ? AND revision = ?",
        )?;

        let mut rows = stmt.query(params![filename, revision])?;
        match rows.next()? {
            Some(row) => Ok(Some(change_from_row(row, 0)?)),
            None => Ok(None),
        }
    }
}

fn change_from_row(row: &rusqlite::Row, offset: usize) -> Result<Change, Error> {
    Ok(Change {
        timestamp: row.get(offset)?,
        author: row.get(offset + 1)?,
        log: row.get(offset + 2)?,
        filestatus: row.get::<_, String>(offset + 3)?.parse()?,
        filename: row.get(offset + 4)?,
        revision: row.get(offset + 5)?,
        state: row.get(offset + 6)?,
        mode: row.get(offset + 7)?,
    })
}

/// Iterator over the snapshot taken by [`Store::changes_by_timestamp`].
#[derive(Debug)]
pub struct Changes<'a> {
    store: &'a Store,
    keys: VecDeque<(String, String)>,
}

impl Changes<'_> {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Iterator for Changes<'_> {
    type Item = Result<Change, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (filename, revision) = self.keys.pop_front()?;
            match self.store.change_by_key(&filename, &revision) {
                Ok(Some(change)) => return Some(Ok(change)),
                // The row vanished since the snapshot; nothing deletes
                // changes, but tolerate it rather than failing the run.
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
