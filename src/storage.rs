//! Local persistence for the notice ledger.
//!
//! The ledger is a single `SQLite` file holding one append-only table:
//!
//! ```text
//! notices(id, recorded_at, tick_id, obligation_id, kind, channel,
//!         destination, outcome, detail)
//! ```
//!
//! Rows are only ever inserted. Columns are plain `TEXT` without checks so a
//! hand-edited or foreign-written row can exist; reads skip such rows.

mod ledger;

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use rusqlite::Connection;

use crate::model::{NoticeKind, NoticeRecord, ObligationId};

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("ledger connection poisoned by a panicked worker")]
    Poisoned,
}

pub type Result<T> = core::result::Result<T, StorageError>;

/// The durable record of notice attempts, as the engine sees it.
pub trait Ledger {
    /// Notice kinds with at least one `Sent` row for this obligation.
    fn issued_kinds(&self, obligation_id: &ObligationId) -> Result<HashSet<NoticeKind>>;

    /// Persists all records or none of them.
    fn append_all(&self, records: &[NoticeRecord]) -> Result<()>;

    /// Persists one record.
    fn append(&self, record: &NoticeRecord) -> Result<()> {
        self.append_all(std::slice::from_ref(record))
    }
}

/// `SQLite`-backed notice ledger.
pub struct Storage {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl Storage {
    /// Opens the ledger at `path`, creating the file and schema if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        // The scheduler and a manual `tick` may share the file.
        conn.busy_timeout(Duration::from_secs(10))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS notices (
                 id            INTEGER PRIMARY KEY AUTOINCREMENT,
                 recorded_at   TEXT,
                 tick_id       TEXT,
                 obligation_id TEXT,
                 kind          TEXT,
                 channel       TEXT,
                 destination   TEXT,
                 outcome       TEXT,
                 detail        TEXT
             );
             CREATE INDEX IF NOT EXISTS notices_by_obligation
                 ON notices (obligation_id, kind, outcome);",
        )?;
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn open_creates_missing_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("ledger.sqlite");

        let storage = Storage::open(&path).unwrap();

        assert!(path.is_file());
        assert_eq!(storage.path(), path.as_path());
    }

    #[test]
    fn reopening_keeps_existing_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.sqlite");

        drop(Storage::open(&path).unwrap());
        let storage = Storage::open(&path).unwrap();

        let count: i64 = storage
            .conn()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM notices", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
