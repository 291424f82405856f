//! SQLite snapshot backend
//!
//! Schema:
//! - allocation_snapshots: one row per month label, records and metadata as JSON
//! - store_metadata: key/value pairs, holds the schema version
//!
//! `INSERT OR REPLACE` on the primary key makes each put a single atomic row
//! replace. The connection sits behind a mutex, so writes are serialized.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use super::SnapshotBackend;
use crate::models::SnapshotEntry;

/// Current schema version
///
/// Version History:
/// - v1: Initial layout (month_label, data, timestamp, metadata)
const SCHEMA_VERSION: i32 = 1;

/// Default database file name inside the data directory
pub const DATABASE_FILE: &str = "allocation-history.db";

/// SQLite-based snapshot storage (thread-safe)
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteBackend {
    /// Create or open `allocation-history.db` inside `data_dir`
    pub fn open_in_dir(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir).with_context(|| {
            format!("Failed to create data directory: {}", data_dir.display())
        })?;
        Self::open(&data_dir.join(DATABASE_FILE))
    }

    /// Create or open a database file
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open snapshot database: {}", db_path.display()))?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL mode")?;

        let backend = Self::with_connection(conn, Some(db_path.to_path_buf()))?;
        debug!(path = %db_path.display(), "SQLite snapshot backend initialized");
        Ok(backend)
    }

    /// Private in-memory database, gone when dropped
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn, None)
    }

    fn with_connection(conn: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS store_metadata (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS allocation_snapshots (
                month_label TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                metadata TEXT NOT NULL
            );
            "#,
        )
        .context("Failed to create schema")?;

        let stored_version: Option<i32> = conn
            .query_row(
                "SELECT value FROM store_metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query schema version")?;

        match stored_version {
            Some(v) if v > SCHEMA_VERSION => {
                warn!(
                    stored = v,
                    current = SCHEMA_VERSION,
                    "Snapshot database written by a newer version, reading anyway"
                );
            }
            Some(v) if v == SCHEMA_VERSION => {
                debug!("Schema version {} matches current", SCHEMA_VERSION);
            }
            _ => {
                conn.execute(
                    "INSERT OR REPLACE INTO store_metadata (key, value) \
                     VALUES ('schema_version', ?)",
                    params![SCHEMA_VERSION],
                )
                .context("Failed to record schema version")?;
                debug!("Schema version set to {}", SCHEMA_VERSION);
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Snapshot database lock poisoned: {}", e))
    }
}

impl SnapshotBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn put(&self, month_label: &str, entry: &SnapshotEntry) -> Result<()> {
        let data = serde_json::to_string(&entry.data).context("Failed to serialize records")?;
        let metadata =
            serde_json::to_string(&entry.metadata).context("Failed to serialize metadata")?;

        let conn = self.lock()?;
        conn.execute(
            r#"
                INSERT OR REPLACE INTO allocation_snapshots
                (month_label, data, timestamp, metadata)
                VALUES (?, ?, ?, ?)
                "#,
            params![month_label, data, entry.timestamp.to_rfc3339(), metadata],
        )
        .with_context(|| format!("Failed to write snapshot '{}'", month_label))?;

        debug!(label = month_label, "Snapshot row written");
        Ok(())
    }

    fn get(&self, month_label: &str) -> Result<Option<SnapshotEntry>> {
        let conn = self.lock()?;
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT data, timestamp, metadata FROM allocation_snapshots WHERE month_label = ?",
                params![month_label],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .with_context(|| format!("Failed to query snapshot '{}'", month_label))?;
        drop(conn);

        let Some((data, timestamp, metadata)) = row else {
            return Ok(None);
        };

        let entry = SnapshotEntry {
            data: serde_json::from_str(&data)
                .with_context(|| format!("Corrupt records for '{}'", month_label))?,
            timestamp: DateTime::parse_from_rfc3339(&timestamp)
                .with_context(|| format!("Corrupt timestamp for '{}'", month_label))?
                .with_timezone(&Utc),
            metadata: serde_json::from_str(&metadata)
                .with_context(|| format!("Corrupt metadata for '{}'", month_label))?,
        };
        Ok(Some(entry))
    }

    fn labels(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT month_label FROM allocation_snapshots")
            .context("Failed to prepare label query")?;

        let labels = stmt
            .query_map([], |row| row.get(0))
            .context("Failed to list labels")?
            .collect::<std::result::Result<Vec<String>, _>>()
            .context("Failed to read label row")?;

        Ok(labels)
    }

    fn remove(&self, month_label: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM allocation_snapshots WHERE month_label = ?",
                params![month_label],
            )
            .with_context(|| format!("Failed to delete snapshot '{}'", month_label))?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AllocationRecord, SnapshotMetadata};

    fn entry(records: Vec<AllocationRecord>) -> SnapshotEntry {
        SnapshotEntry {
            data: records,
            timestamp: Utc::now(),
            metadata: SnapshotMetadata::from_source("test"),
        }
    }

    #[test]
    fn test_put_get_roundtrip_in_memory() {
        let backend = SqliteBackend::in_memory().unwrap();
        let stored = entry(vec![AllocationRecord::new("EX-65", 4, 800.0).with_job("J-1")]);

        backend.put("April 2025", &stored).unwrap();
        let loaded = backend.get("April 2025").unwrap().unwrap();

        assert_eq!(loaded.data, stored.data);
        assert_eq!(loaded.metadata, stored.metadata);
        assert!(backend.get("May 2025").unwrap().is_none());
    }

    #[test]
    fn test_put_replaces_existing_row() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend
            .put("April 2025", &entry(vec![AllocationRecord::new("EX-65", 1, 1.0)]))
            .unwrap();
        backend
            .put("April 2025", &entry(vec![AllocationRecord::new("EX-99", 2, 2.0)]))
            .unwrap();

        assert_eq!(backend.labels().unwrap(), vec!["April 2025".to_string()]);
        let loaded = backend.get("April 2025").unwrap().unwrap();
        assert_eq!(loaded.data[0].equipment_id, "EX-99");
    }

    #[test]
    fn test_corrupt_row_is_an_error_not_a_panic() {
        let backend = SqliteBackend::in_memory().unwrap();
        {
            let conn = backend.lock().unwrap();
            conn.execute(
                "INSERT INTO allocation_snapshots VALUES ('June 2025', 'not json', 'x', '{}')",
                [],
            )
            .unwrap();
        }
        assert!(backend.get("June 2025").is_err());
    }

    #[test]
    fn test_reopen_file_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backend = SqliteBackend::open_in_dir(dir.path()).unwrap();
            backend
                .put("March 2025", &entry(vec![AllocationRecord::new("EX-1", 1, 5.0)]))
                .unwrap();
        }
        let backend = SqliteBackend::open_in_dir(dir.path()).unwrap();
        assert_eq!(backend.path(), Some(dir.path().join(DATABASE_FILE).as_path()));
        assert!(backend.get("March 2025").unwrap().is_some());
        assert!(backend.remove("March 2025").unwrap());
        assert!(!backend.remove("March 2025").unwrap());
    }
}
