//! `SQLite` storage layer for keel.
//!
//! This module manages the `SQLite` database that holds issues, scopes, links,
//! and relationship edges. All multi-row mutations run inside a single
//! transaction; write transactions are opened `IMMEDIATE` so the dedup check
//! and the subsequent write hold the database write lock together.
//!
//! ## Module Structure
//!
//! - `schema` - Database schema (DDL)
//! - `helpers` - Row conversion and parsing utilities
//! - `issues` - Lifecycle operations (create-or-update, update, delete, bulk resolve)
//! - `links` - Link replacement and loading
//! - `related` - Relationship edge operations
//! - `queries` - Filtered retrieval with associations
//! - `trait_impl` - [`crate::engine::IssueEngine`] implementation

mod helpers;
mod issues;
mod links;
mod queries;
mod related;
mod schema;
mod trait_impl;

pub(crate) use helpers::{
    ISSUE_COLUMNS, LINK_COLUMNS, RELATED_COLUMNS, dedup_key, is_unique_violation, parse_state,
    row_to_issue, row_to_link, row_to_related, to_micros,
};
pub(crate) use schema::SCHEMA;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::{Error, Result};

/// `SQLite`-backed issue store.
///
/// The connection is wrapped in a `Mutex` to allow sharing across callers
/// while maintaining thread safety; one store holds one connection, and
/// independent stores may be opened on the same database file (writers are
/// serialized by `SQLite` itself, bounded by the busy timeout).
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

/// How long a writer waits for a competing connection's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl SqliteStore {
    /// Open or create the store database at `path`.
    ///
    /// Enables WAL journal mode and foreign key enforcement, and applies the
    /// schema.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the parent directory cannot be created, or
    /// `Error::Database` if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        // Busy timeout first: a concurrent open() may be mid-way through the
        // journal-mode switch or the schema batch on the same file.
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::configure(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an ephemeral in-memory store. Used by tests and by callers that
    /// want dedup semantics without persistence.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the database cannot be initialized.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Path of the backing database file; `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Acquire the connection lock.
    ///
    /// Returns a `MutexGuard` providing exclusive access to the underlying
    /// connection. Used internally by all database operations; the guard is
    /// always released before an operation reloads the record it touched.
    pub(crate) fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            Error::Internal(format!(
                "database connection mutex poisoned (a thread panicked while holding the lock): {e}"
            ))
        })
    }

    /// Current time, shared by every row a single operation touches.
    pub(crate) fn now() -> DateTime<Utc> {
        Utc::now()
    }

    /// Fresh opaque identifier for a new row.
    pub(crate) fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Get total row counts across the four relations, for diagnostics and
    /// tests.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` on storage failure.
    pub fn counts(&self) -> Result<StoreCounts> {
        let conn = self.connection()?;

        let issues: i64 = conn.query_row("SELECT COUNT(*) FROM issues", [], |row| row.get(0))?;
        let scopes: i64 =
            conn.query_row("SELECT COUNT(*) FROM issue_scopes", [], |row| row.get(0))?;
        let links: i64 = conn.query_row("SELECT COUNT(*) FROM links", [], |row| row.get(0))?;
        let related: i64 =
            conn.query_row("SELECT COUNT(*) FROM related_issues", [], |row| row.get(0))?;

        // COUNT(*) returns non-negative values
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let counts = StoreCounts {
            issues: issues as usize,
            scopes: scopes as usize,
            links: links as usize,
            related: related as usize,
        };
        Ok(counts)
    }
}

/// Row counts across the store's four relations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    /// Number of issue rows
    pub issues: usize,

    /// Number of scope rows
    pub scopes: usize,

    /// Number of link rows
    pub links: usize,

    /// Number of relationship edges
    pub related: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn temp_db() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("should create temp directory");
        let path = dir.path().join("keel.db");
        (dir, path)
    }

    #[test]
    fn open_creates_database_and_schema() {
        let (_dir, path) = temp_db();

        let store = SqliteStore::open(&path).expect("failed to open database");
        let conn = store.connection().expect("should get connection");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"issues".to_string()));
        assert!(tables.contains(&"issue_scopes".to_string()));
        assert!(tables.contains(&"links".to_string()));
        assert!(tables.contains(&"related_issues".to_string()));
    }

    #[test]
    fn open_is_idempotent() {
        let (_dir, path) = temp_db();

        {
            let _store = SqliteStore::open(&path).expect("first open");
        }
        // Reopening must tolerate the existing schema.
        let store = SqliteStore::open(&path).expect("second open");
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn in_memory_store_has_no_path() {
        let store = SqliteStore::open_in_memory().expect("in-memory open");
        assert!(store.path().is_none());
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.connection().unwrap();

        let result = conn.execute(
            "INSERT INTO links (id, title, url, issue_id) VALUES ('l1', 't', 'u', 'missing')",
            [],
        );
        assert!(result.is_err(), "link referencing a missing issue must fail");
    }
}
