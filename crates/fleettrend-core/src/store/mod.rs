//! Snapshot store with pluggable backends
//!
//! `SnapshotStore` owns month-label parsing, validation and history ordering.
//! Backends only move `SnapshotEntry` values in and out of durable storage,
//! so SQLite and the JSON file are interchangeable behind one interface.

pub mod json_file;
pub mod sqlite;

pub use json_file::JsonFileBackend;
pub use sqlite::SqliteBackend;

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use crate::error::{CoreError, LoadError, LoadReport};
use crate::models::{AllocationRecord, MonthKey, MonthlySnapshot, SnapshotEntry, SnapshotMetadata};

/// Durable storage for snapshot entries keyed by month label
///
/// `put` must replace an existing entry atomically: readers either see the
/// old entry or the new one, never a mix.
pub trait SnapshotBackend: Send + Sync {
    /// Short backend name for logs and errors
    fn name(&self) -> &'static str;

    /// Insert or replace the entry stored under `month_label`
    fn put(&self, month_label: &str, entry: &SnapshotEntry) -> anyhow::Result<()>;

    /// Fetch one entry, `None` if the label is not stored
    fn get(&self, month_label: &str) -> anyhow::Result<Option<SnapshotEntry>>;

    /// Fetch several entries, one result per label in input order
    fn get_many(
        &self,
        month_labels: &[String],
    ) -> Vec<(String, anyhow::Result<Option<SnapshotEntry>>)> {
        month_labels
            .iter()
            .map(|label| (label.clone(), self.get(label)))
            .collect()
    }

    /// Every stored label, parseable or not
    fn labels(&self) -> anyhow::Result<Vec<String>>;

    /// Delete an entry, returning whether it existed
    fn remove(&self, month_label: &str) -> anyhow::Result<bool>;
}

/// Outcome of a successful write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PutReceipt {
    /// Canonical label the snapshot was stored under
    pub month_label: String,
    /// Records persisted
    pub stored: usize,
    /// Records rejected (no equipment id or non-positive amount)
    pub dropped: usize,
}

/// Result of a history read: whatever could be loaded, plus what went wrong
#[derive(Debug, Clone, Default, Serialize)]
pub struct History {
    /// Most recent month first
    pub snapshots: Vec<MonthlySnapshot>,
    pub report: LoadReport,
}

impl History {
    /// Snapshots oldest first, the order trend series are built in
    pub fn chronological(&self) -> impl Iterator<Item = &MonthlySnapshot> {
        self.snapshots.iter().rev()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }
}

/// Monthly allocation snapshot store
pub struct SnapshotStore {
    backend: Box<dyn SnapshotBackend>,
}

impl SnapshotStore {
    /// Create a store over an already-opened backend
    pub fn new(backend: impl SnapshotBackend + 'static) -> Self {
        Self::from_boxed(Box::new(backend))
    }

    pub fn from_boxed(backend: Box<dyn SnapshotBackend>) -> Self {
        debug!(backend = backend.name(), "Snapshot store initialized");
        Self { backend }
    }

    /// Name of the active backend
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Validate and store a snapshot, replacing any previous one for the month
    ///
    /// The label is normalized to its canonical form ("apr 2025" is stored as
    /// "April 2025"), so differently spelled labels for one month replace
    /// each other.
    pub fn try_put(
        &self,
        month_label: &str,
        records: Vec<AllocationRecord>,
        metadata: SnapshotMetadata,
    ) -> Result<PutReceipt, CoreError> {
        let key = MonthKey::parse(month_label).ok_or_else(|| CoreError::InvalidMonthLabel {
            label: month_label.to_string(),
        })?;

        let total = records.len();
        let data: Vec<AllocationRecord> = records
            .into_iter()
            .map(AllocationRecord::normalized)
            .filter(AllocationRecord::is_storable)
            .collect();
        let dropped = total - data.len();
        if dropped > 0 {
            debug!(
                label = %key,
                dropped,
                "Dropped records without equipment id or positive amount"
            );
        }

        let canonical = key.label();
        let entry = SnapshotEntry {
            data,
            timestamp: Utc::now(),
            metadata,
        };

        self.backend
            .put(&canonical, &entry)
            .map_err(|e| CoreError::storage(self.backend.name(), &e))?;

        info!(
            label = %canonical,
            backend = self.backend.name(),
            stored = entry.data.len(),
            dropped,
            "Snapshot stored"
        );

        Ok(PutReceipt {
            month_label: canonical,
            stored: entry.data.len(),
            dropped,
        })
    }

    /// Store a snapshot, reporting failure as `false` (logged) instead of an error
    pub fn put(
        &self,
        month_label: &str,
        records: Vec<AllocationRecord>,
        metadata: SnapshotMetadata,
    ) -> bool {
        match self.try_put(month_label, records, metadata) {
            Ok(_) => true,
            Err(e) => {
                error!(label = month_label, error = %e, "Failed to store snapshot");
                false
            }
        }
    }

    /// Up to `months` most recent snapshots, newest first
    ///
    /// Stored labels that do not parse as a month are skipped and listed in
    /// the report. Storage faults are reported, and whatever could be read is
    /// still returned.
    pub fn get_history(&self, months: usize) -> History {
        let mut report = LoadReport::new();
        let backend = self.backend.name();

        let labels = match self.backend.labels() {
            Ok(labels) => labels,
            Err(e) => {
                error!(backend, error = %format!("{:#}", e), "Failed to list snapshot labels");
                report.add_fatal(backend, format!("Failed to list snapshots: {:#}", e));
                return History {
                    snapshots: Vec::new(),
                    report,
                };
            }
        };

        let selected = newest_labels(labels, months, &mut report);
        let wanted: Vec<String> = selected.iter().map(|(_, label)| label.clone()).collect();
        let fetched = self.backend.get_many(&wanted);

        let mut snapshots = Vec::new();
        for ((key, _), (label, result)) in selected.into_iter().zip(fetched) {
            match result {
                Ok(Some(entry)) => snapshots.push(MonthlySnapshot::from_entry(key, label, entry)),
                Ok(None) => {
                    debug!(label = %label, "Snapshot disappeared between listing and read");
                }
                Err(e) => {
                    warn!(
                        label = %label,
                        backend,
                        error = %format!("{:#}", e),
                        "Failed to read snapshot"
                    );
                    report.add_error(LoadError::error(
                        backend,
                        format!("Failed to read '{}': {:#}", label, e),
                    ));
                }
            }
        }

        report.snapshots_loaded = snapshots.len();
        debug!(
            requested = months,
            loaded = snapshots.len(),
            skipped = report.labels_skipped.len(),
            "History read"
        );

        History { snapshots, report }
    }

    /// Fetch a single month by label
    pub fn get(&self, month_label: &str) -> Result<Option<MonthlySnapshot>, CoreError> {
        let key = MonthKey::parse(month_label).ok_or_else(|| CoreError::InvalidMonthLabel {
            label: month_label.to_string(),
        })?;
        let canonical = key.label();

        let entry = self
            .backend
            .get(&canonical)
            .map_err(|e| CoreError::storage(self.backend.name(), &e))?;

        Ok(entry.map(|entry| MonthlySnapshot::from_entry(key, canonical, entry)))
    }

    /// All stored labels as the backend holds them, malformed ones included
    pub fn labels(&self) -> Result<Vec<String>, CoreError> {
        self.backend
            .labels()
            .map_err(|e| CoreError::storage(self.backend.name(), &e))
    }

    /// Delete a snapshot; `false` if it was absent or the delete failed
    pub fn remove(&self, month_label: &str) -> bool {
        let label = MonthKey::parse(month_label)
            .map(|k| k.label())
            .unwrap_or_else(|| month_label.to_string());

        match self.backend.remove(&label) {
            Ok(existed) => {
                info!(label = %label, existed, "Snapshot removed");
                existed
            }
            Err(e) => {
                error!(label = %label, error = %format!("{:#}", e), "Failed to remove snapshot");
                false
            }
        }
    }
}

/// Parse, deduplicate and order stored labels, newest first, keeping `months`
///
/// When two stored labels name the same month, the canonical spelling wins,
/// otherwise the lexicographically smallest one.
fn newest_labels(
    labels: Vec<String>,
    months: usize,
    report: &mut LoadReport,
) -> Vec<(MonthKey, String)> {
    let mut by_key: BTreeMap<MonthKey, String> = BTreeMap::new();

    for label in labels {
        let Some(key) = MonthKey::parse(&label) else {
            debug!(label = %label, "Skipping malformed month label");
            report.skip_label(label);
            continue;
        };

        match by_key.get(&key) {
            Some(existing) if *existing == key.label() => {}
            Some(existing) if label != key.label() && *existing <= label => {}
            _ => {
                by_key.insert(key, label);
            }
        }
    }

    by_key.into_iter().rev().take(months).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory backend that can be told to fail
    #[derive(Default)]
    struct MemoryBackend {
        entries: Mutex<BTreeMap<String, SnapshotEntry>>,
        fail_writes: bool,
        fail_reads_for: Option<String>,
    }

    impl SnapshotBackend for MemoryBackend {
        fn name(&self) -> &'static str {
            "memory"
        }

        fn put(&self, month_label: &str, entry: &SnapshotEntry) -> anyhow::Result<()> {
            if self.fail_writes {
                anyhow::bail!("disk full");
            }
            self.entries
                .lock()
                .insert(month_label.to_string(), entry.clone());
            Ok(())
        }

        fn get(&self, month_label: &str) -> anyhow::Result<Option<SnapshotEntry>> {
            if self.fail_reads_for.as_deref() == Some(month_label) {
                anyhow::bail!("corrupt row");
            }
            Ok(self.entries.lock().get(month_label).cloned())
        }

        fn labels(&self) -> anyhow::Result<Vec<String>> {
            Ok(self.entries.lock().keys().cloned().collect())
        }

        fn remove(&self, month_label: &str) -> anyhow::Result<bool> {
            Ok(self.entries.lock().remove(month_label).is_some())
        }
    }

    /// Backend that only answers batch reads, counting them
    #[derive(Default)]
    struct BatchOnlyBackend {
        inner: MemoryBackend,
        batches: AtomicUsize,
    }

    impl SnapshotBackend for BatchOnlyBackend {
        fn name(&self) -> &'static str {
            "batch"
        }

        fn put(&self, month_label: &str, entry: &SnapshotEntry) -> anyhow::Result<()> {
            self.inner.put(month_label, entry)
        }

        fn get(&self, _month_label: &str) -> anyhow::Result<Option<SnapshotEntry>> {
            anyhow::bail!("single reads disabled")
        }

        fn get_many(
            &self,
            month_labels: &[String],
        ) -> Vec<(String, anyhow::Result<Option<SnapshotEntry>>)> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.inner.get_many(month_labels)
        }

        fn labels(&self) -> anyhow::Result<Vec<String>> {
            self.inner.labels()
        }

        fn remove(&self, month_label: &str) -> anyhow::Result<bool> {
            self.inner.remove(month_label)
        }
    }

    fn raw_entry(amount: f64) -> SnapshotEntry {
        SnapshotEntry {
            data: vec![AllocationRecord::new("EX-65", 5, amount)],
            timestamp: Utc::now(),
            metadata: SnapshotMetadata::default(),
        }
    }

    #[test]
    fn test_put_normalizes_label_and_drops_invalid_records() {
        let store = SnapshotStore::new(MemoryBackend::default());
        let receipt = store
            .try_put(
                "apr 2025",
                vec![
                    AllocationRecord::new("EX-65", 10, 1000.0),
                    AllocationRecord::new("", 10, 1000.0),
                    AllocationRecord::new("EX-70", 3, 0.0),
                ],
                SnapshotMetadata::from_source("april.xlsx"),
            )
            .unwrap();

        assert_eq!(receipt.month_label, "April 2025");
        assert_eq!(receipt.stored, 1);
        assert_eq!(receipt.dropped, 2);

        let snapshot = store.get("April 2025").unwrap().unwrap();
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.metadata.source.as_deref(), Some("april.xlsx"));
    }

    #[test]
    fn test_put_rejects_unparseable_label() {
        let store = SnapshotStore::new(MemoryBackend::default());
        let err = store
            .try_put("Blorf 2025", vec![], SnapshotMetadata::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidMonthLabel { .. }));
        assert!(!store.put("Blorf 2025", vec![], SnapshotMetadata::default()));
    }

    #[test]
    fn test_put_storage_fault_is_false_not_panic() {
        let store = SnapshotStore::new(MemoryBackend {
            fail_writes: true,
            ..Default::default()
        });
        let records = vec![AllocationRecord::new("EX-65", 1, 10.0)];

        assert!(!store.put("April 2025", records.clone(), SnapshotMetadata::default()));
        let err = store
            .try_put("April 2025", records, SnapshotMetadata::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::Storage { backend: "memory", .. }));
    }

    #[test]
    fn test_history_skips_malformed_labels_and_orders_newest_first() {
        let backend = MemoryBackend::default();
        for label in ["January 2025", "Blorf 2025", "March 2025", "November 2024"] {
            backend.put(label, &raw_entry(100.0)).unwrap();
        }
        let store = SnapshotStore::new(backend);

        let history = store.get_history(6);
        let labels: Vec<&str> = history
            .snapshots
            .iter()
            .map(|s| s.month_label.as_str())
            .collect();
        assert_eq!(labels, vec!["March 2025", "January 2025", "November 2024"]);
        assert_eq!(history.report.labels_skipped, vec!["Blorf 2025".to_string()]);
        assert!(!history.report.has_fatal_errors());

        let chronological: Vec<&str> = history
            .chronological()
            .map(|s| s.month_label.as_str())
            .collect();
        assert_eq!(chronological, vec!["November 2024", "January 2025", "March 2025"]);
    }

    #[test]
    fn test_history_limits_to_requested_months() {
        let backend = MemoryBackend::default();
        for month in ["January", "February", "March", "April"] {
            backend.put(&format!("{} 2025", month), &raw_entry(1.0)).unwrap();
        }
        let store = SnapshotStore::new(backend);

        let history = store.get_history(2);
        assert_eq!(history.len(), 2);
        assert_eq!(history.snapshots[0].month_label, "April 2025");
        assert_eq!(history.snapshots[1].month_label, "March 2025");
        assert!(store.get_history(0).is_empty());
    }

    #[test]
    fn test_history_prefers_canonical_label_for_duplicate_month() {
        let backend = MemoryBackend::default();
        backend.put("apr 2025", &raw_entry(1.0)).unwrap();
        backend.put("April 2025", &raw_entry(2.0)).unwrap();
        let store = SnapshotStore::new(backend);

        let history = store.get_history(6);
        assert_eq!(history.len(), 1);
        assert_eq!(history.snapshots[0].month_label, "April 2025");
        assert_eq!(history.snapshots[0].total_amount(), 2.0);
    }

    #[test]
    fn test_history_read_fault_keeps_other_months() {
        let backend = MemoryBackend {
            fail_reads_for: Some("February 2025".to_string()),
            ..Default::default()
        };
        backend.put("January 2025", &raw_entry(1.0)).unwrap();
        backend.put("February 2025", &raw_entry(2.0)).unwrap();
        let store = SnapshotStore::new(backend);

        let history = store.get_history(6);
        assert_eq!(history.len(), 1);
        assert_eq!(history.snapshots[0].month_label, "January 2025");
        assert_eq!(history.report.error_count(), (0, 1, 0));
    }

    #[test]
    fn test_remove_reports_existence() {
        let store = SnapshotStore::new(MemoryBackend::default());
        assert!(store.put(
            "May 2025",
            vec![AllocationRecord::new("EX-65", 1, 1.0)],
            SnapshotMetadata::default()
        ));
        assert!(store.remove("may 2025"));
        assert!(!store.remove("May 2025"));
        assert!(store.get_history(6).is_empty());
    }

    #[test]
    fn test_history_reads_window_in_one_batch() {
        let backend = BatchOnlyBackend::default();
        for month in ["January", "February", "March", "April"] {
            backend.put(&format!("{} 2025", month), &raw_entry(1.0)).unwrap();
        }
        let backend = std::sync::Arc::new(backend);
        let store = SnapshotStore::new(SharedBackend(std::sync::Arc::clone(&backend)));

        let history = store.get_history(3);
        assert_eq!(history.len(), 3);
        assert!(!history.report.has_errors());
        assert_eq!(backend.batches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_put_trims_equipment_and_job_ids() {
        let store = SnapshotStore::new(MemoryBackend::default());
        store
            .try_put(
                "April 2025",
                vec![AllocationRecord::new(" EX-65 ", 3, 30.0).with_job("  ")],
                SnapshotMetadata::default(),
            )
            .unwrap();

        let snapshot = store.get("April 2025").unwrap().unwrap();
        assert_eq!(snapshot.records[0].equipment_id, "EX-65");
        assert_eq!(snapshot.records[0].job_number, None);
    }

    /// Lets a test keep a handle on the backend it gave the store
    struct SharedBackend(std::sync::Arc<BatchOnlyBackend>);

    impl SnapshotBackend for SharedBackend {
        fn name(&self) -> &'static str {
            self.0.name()
        }

        fn put(&self, month_label: &str, entry: &SnapshotEntry) -> anyhow::Result<()> {
            self.0.put(month_label, entry)
        }

        fn get(&self, month_label: &str) -> anyhow::Result<Option<SnapshotEntry>> {
            self.0.get(month_label)
        }

        fn get_many(
            &self,
            month_labels: &[String],
        ) -> Vec<(String, anyhow::Result<Option<SnapshotEntry>>)> {
            self.0.get_many(month_labels)
        }

        fn labels(&self) -> anyhow::Result<Vec<String>> {
            self.0.labels()
        }

        fn remove(&self, month_label: &str) -> anyhow::Result<bool> {
            self.0.remove(month_label)
        }
    }
}
