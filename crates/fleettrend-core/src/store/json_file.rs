//! Flat-file JSON snapshot backend
//!
//! Stores every snapshot in one document shaped
//! `{ "<month label>": { "data": [...], "timestamp": ..., "metadata": {...} } }`.
//! Writers hold an advisory lock on `<document>.lock` for the whole
//! read-modify-write, so separate processes and separate backend instances
//! never lose each other's puts. The new document is written to a uniquely
//! named temp file and renamed over the old one, so a reader never sees a
//! half-written file.

use anyhow::{anyhow, Context, Result};
use fd_lock::RwLock as FileLock;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use super::SnapshotBackend;
use crate::models::SnapshotEntry;

/// Default document name inside the data directory
pub const DOCUMENT_FILE: &str = "allocation_history.json";

type Document = BTreeMap<String, serde_json::Value>;

/// JSON document storage
///
/// Entries are kept as raw JSON until read, so one malformed entry only
/// fails reads of that label.
pub struct JsonFileBackend {
    path: PathBuf,
    /// Serializes access within the process; the lock file covers the rest
    lock: RwLock<()>,
}

impl JsonFileBackend {
    /// Use `allocation_history.json` inside `data_dir`
    pub fn open_in_dir(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir).with_context(|| {
            format!("Failed to create data directory: {}", data_dir.display())
        })?;
        Ok(Self::new(data_dir.join(DOCUMENT_FILE)))
    }

    /// Use an explicit document path; the file is created on first write
    pub fn new(path: PathBuf) -> Self {
        debug!(path = %path.display(), "JSON snapshot backend initialized");
        Self {
            path,
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Advisory lock file shared by every writer of this document
    pub fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    fn open_lock_file(&self) -> Result<FileLock<File>> {
        let dir = self.directory();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;
        Ok(FileLock::new(file))
    }

    /// Apply `change` to the document under both locks, writing it back if
    /// `change` reports a modification
    fn modify<T>(&self, change: impl FnOnce(&mut Document) -> (T, bool)) -> Result<T> {
        let _guard = self.lock.write();
        let mut lock_file = self.open_lock_file()?;
        let _file_guard = lock_file
            .write()
            .with_context(|| format!("Failed to lock {}", self.lock_path().display()))?;

        let mut document = self.read_document()?;
        let (result, changed) = change(&mut document);
        if changed {
            self.write_document(&document)?;
        }
        Ok(result)
    }

    fn read_document(&self) -> Result<Document> {
        if !self.path.exists() {
            return Ok(Document::new());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read snapshot file: {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(Document::new());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot file: {}", self.path.display()))
    }

    fn write_document(&self, document: &Document) -> Result<()> {
        let dir = self.directory();
        let content =
            serde_json::to_string_pretty(document).context("Failed to serialize snapshots")?;

        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write temp file: {}", tmp.path().display()))?;
        tmp.as_file()
            .sync_all()
            .context("Failed to flush snapshot temp file")?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace snapshot file: {}", self.path.display()))?;
        Ok(())
    }
}

fn decode_entry(month_label: &str, value: serde_json::Value) -> Result<SnapshotEntry> {
    serde_json::from_value(value)
        .with_context(|| format!("Malformed snapshot entry '{}'", month_label))
}

impl SnapshotBackend for JsonFileBackend {
    fn name(&self) -> &'static str {
        "json"
    }

    fn put(&self, month_label: &str, entry: &SnapshotEntry) -> Result<()> {
        let value = serde_json::to_value(entry).context("Failed to serialize snapshot")?;

        self.modify(|document| {
            document.insert(month_label.to_string(), value);
            ((), true)
        })?;

        debug!(label = month_label, path = %self.path.display(), "Snapshot written");
        Ok(())
    }

    fn get(&self, month_label: &str) -> Result<Option<SnapshotEntry>> {
        let value = {
            let _guard = self.lock.read();
            self.read_document()?.remove(month_label)
        };

        value.map(|v| decode_entry(month_label, v)).transpose()
    }

    /// One document read for the whole batch
    fn get_many(&self, month_labels: &[String]) -> Vec<(String, Result<Option<SnapshotEntry>>)> {
        let document = {
            let _guard = self.lock.read();
            self.read_document()
        };

        match document {
            Ok(mut document) => month_labels
                .iter()
                .map(|label| {
                    let entry = document
                        .remove(label)
                        .map(|v| decode_entry(label, v))
                        .transpose();
                    (label.clone(), entry)
                })
                .collect(),
            Err(e) => {
                let message = format!("{:#}", e);
                month_labels
                    .iter()
                    .map(|label| (label.clone(), Err(anyhow!(message.clone()))))
                    .collect()
            }
        }
    }

    fn labels(&self) -> Result<Vec<String>> {
        let _guard = self.lock.read();
        Ok(self.read_document()?.into_keys().collect())
    }

    fn remove(&self, month_label: &str) -> Result<bool> {
        self.modify(|document| {
            let existed = document.remove(month_label).is_some();
            (existed, existed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AllocationRecord, SnapshotMetadata};
    use chrono::Utc;

    /// One malformed entry next to a valid one
    const MIXED_DOCUMENT: &str = concat!(
        r#"{"March 2025": {"data": "oops"}, "#,
        r#""April 2025": {"data": [], "timestamp": "2025-04-30T00:00:00Z"}}"#,
    );

    fn entry(equipment: &str) -> SnapshotEntry {
        SnapshotEntry {
            data: vec![AllocationRecord::new(equipment, 3, 300.0).with_cost_code("CC-1")],
            timestamp: Utc::now(),
            metadata: SnapshotMetadata::default(),
        }
    }

    #[test]
    fn test_missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::open_in_dir(dir.path()).unwrap();
        assert!(backend.labels().unwrap().is_empty());
        assert!(backend.get("April 2025").unwrap().is_none());
    }

    #[test]
    fn test_document_layout_is_keyed_by_label() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::open_in_dir(dir.path()).unwrap();
        backend.put("April 2025", &entry("EX-65")).unwrap();

        let raw = std::fs::read_to_string(backend.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let april = &value["April 2025"];
        assert_eq!(april["data"][0]["equipment_id"], "EX-65");
        assert!(april["timestamp"].is_string());
        assert!(april["metadata"].is_object());

        let mut files: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(files, vec![DOCUMENT_FILE.to_string(), format!("{}.lock", DOCUMENT_FILE)]);
    }

    #[test]
    fn test_malformed_entry_only_fails_its_own_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DOCUMENT_FILE);
        std::fs::write(&path, MIXED_DOCUMENT).unwrap();
        let backend = JsonFileBackend::new(path);

        assert_eq!(backend.labels().unwrap().len(), 2);
        assert!(backend.get("March 2025").is_err());
        assert!(backend.get("April 2025").unwrap().is_some());
    }

    #[test]
    fn test_unreadable_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DOCUMENT_FILE);
        std::fs::write(&path, "[1, 2").unwrap();
        let backend = JsonFileBackend::new(path);
        assert!(backend.labels().is_err());
    }

    #[test]
    fn test_remove_rewrites_document() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::open_in_dir(dir.path()).unwrap();
        backend.put("April 2025", &entry("EX-65")).unwrap();
        backend.put("May 2025", &entry("EX-70")).unwrap();

        assert!(backend.remove("April 2025").unwrap());
        assert!(!backend.remove("April 2025").unwrap());
        assert_eq!(backend.labels().unwrap(), vec!["May 2025".to_string()]);
    }

    #[test]
    fn test_get_many_matches_single_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DOCUMENT_FILE);
        std::fs::write(&path, MIXED_DOCUMENT).unwrap();
        let backend = JsonFileBackend::new(path);

        let labels = vec![
            "April 2025".to_string(),
            "March 2025".to_string(),
            "May 2025".to_string(),
        ];
        let results = backend.get_many(&labels);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, "April 2025");
        assert!(results[0].1.as_ref().unwrap().is_some());
        assert!(results[1].1.is_err());
        assert!(results[2].1.as_ref().unwrap().is_none());
    }

    #[test]
    fn test_get_many_on_unreadable_document_fails_every_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DOCUMENT_FILE);
        std::fs::write(&path, "{not json").unwrap();
        let backend = JsonFileBackend::new(path);

        let results = backend.get_many(&["April 2025".to_string(), "May 2025".to_string()]);
        assert!(results.iter().all(|(_, r)| r.is_err()));
    }

    #[test]
    fn test_two_instances_on_one_document_keep_every_put() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DOCUMENT_FILE);

        let writers: Vec<_> = ["EX", "DZ"]
            .into_iter()
            .map(|prefix| {
                let backend = JsonFileBackend::new(path.clone());
                std::thread::spawn(move || {
                    for i in 0..60 {
                        let label = format!("{}-{}", prefix, i);
                        backend.put(&label, &entry(prefix)).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let backend = JsonFileBackend::new(path);
        assert_eq!(backend.labels().unwrap().len(), 120);
    }
}
