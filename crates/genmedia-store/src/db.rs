use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use tracing::debug;

use genmedia_core::error::{GenmediaError, Result};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS artifacts (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        mime_type TEXT NOT NULL,
        blob_path TEXT NOT NULL,
        prompt TEXT,
        source TEXT NOT NULL,
        source_job TEXT UNIQUE,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_artifacts_owner
        ON artifacts(owner_id, created_at);

    CREATE TABLE IF NOT EXISTS workflows (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        is_public INTEGER NOT NULL DEFAULT 0,
        thumbnail_ref TEXT,
        owner_id TEXT NOT NULL,
        owner_email TEXT NOT NULL DEFAULT '',
        node_count INTEGER NOT NULL,
        edge_count INTEGER NOT NULL,
        graph TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_workflows_owner
        ON workflows(owner_id, created_at);

    CREATE INDEX IF NOT EXISTS idx_workflows_public
        ON workflows(is_public, created_at);
";

/// Shared SQLite connection holding artifact metadata and workflows.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GenmediaError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(|e| GenmediaError::Database(e.to_string()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| GenmediaError::Database(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| GenmediaError::Database(e.to_string()))?;

        debug!(path = %path.display(), "SQLite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| GenmediaError::Database(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| GenmediaError::Database(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| GenmediaError::Database(e.to_string()))
    }
}

pub(crate) fn db_err(e: rusqlite::Error) -> GenmediaError {
    GenmediaError::Database(e.to_string())
}

/// Fixed-width timestamps so text ordering matches time ordering.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("genmedia.db");
        Database::open(&path).unwrap();
        assert!(path.exists());
        // Reopening an existing database keeps the schema.
        Database::open(&path).unwrap();
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        let a = Utc::now();
        let b = a + chrono::Duration::milliseconds(1500);
        assert!(format_ts(&a) < format_ts(&b));
        assert_eq!(format_ts(&parse_ts(&format_ts(&a))), format_ts(&a));
    }
}
