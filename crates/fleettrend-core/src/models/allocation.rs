//! Allocation records and monthly snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::month::MonthKey;
use crate::error::CoreError;

/// One equipment-to-job assignment within a month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub equipment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    /// Days allocated in the month
    #[serde(default)]
    pub days: u32,
    /// Billed amount in currency units
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_rate: Option<f64>,
}

impl AllocationRecord {
    /// Minimal record, used mostly by tests and fixtures
    pub fn new(equipment_id: impl Into<String>, days: u32, amount: f64) -> Self {
        Self {
            equipment_id: equipment_id.into(),
            job_number: None,
            job_name: None,
            days,
            amount,
            cost_code: None,
            equipment_type: None,
            daily_rate: None,
        }
    }

    pub fn with_job(mut self, job_number: impl Into<String>) -> Self {
        self.job_number = Some(job_number.into());
        self
    }

    pub fn with_job_name(mut self, job_name: impl Into<String>) -> Self {
        self.job_name = Some(job_name.into());
        self
    }

    pub fn with_cost_code(mut self, cost_code: impl Into<String>) -> Self {
        self.cost_code = Some(cost_code.into());
        self
    }

    pub fn with_equipment_type(mut self, equipment_type: impl Into<String>) -> Self {
        self.equipment_type = Some(equipment_type.into());
        self
    }

    /// A record is persisted only with an equipment id and a positive amount
    pub fn is_storable(&self) -> bool {
        !self.equipment().is_empty() && self.amount.is_finite() && self.amount > 0.0
    }

    /// Equipment id without surrounding whitespace
    pub fn equipment(&self) -> &str {
        self.equipment_id.trim()
    }

    /// Trim the id fields so " EX-65 " and "EX-65" are the same unit
    pub fn normalized(mut self) -> Self {
        if self.equipment().len() != self.equipment_id.len() {
            self.equipment_id = self.equipment().to_string();
        }
        if let Some(job) = self.job_number.take() {
            let trimmed = job.trim();
            self.job_number = (!trimmed.is_empty()).then(|| trimmed.to_string());
        }
        self
    }

    /// Job number, treating blank strings as absent
    pub fn job(&self) -> Option<&str> {
        self.job_number
            .as_deref()
            .map(str::trim)
            .filter(|j| !j.is_empty())
    }
}

/// Read already-parsed allocation records from a JSON array file
///
/// This is the ingestion boundary: spreadsheet parsing happens upstream.
pub fn read_records_file(path: &Path) -> Result<Vec<AllocationRecord>, CoreError> {
    let content = std::fs::read_to_string(path).map_err(|source| CoreError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| CoreError::JsonParse {
        path: path.to_path_buf(),
        message: source.to_string(),
        source,
    })
}

/// Ingestion metadata attached to a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Source identifier (file name, upload id, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Free-form extra fields supplied by the ingestion side
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SnapshotMetadata {
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            extra: serde_json::Map::new(),
        }
    }
}

/// Persisted form of one snapshot: `{data, timestamp, metadata}`
///
/// Backends store one entry per month label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub data: Vec<AllocationRecord>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: SnapshotMetadata,
}

/// Full set of allocation facts recorded for one calendar month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySnapshot {
    pub month_label: String,
    pub key: MonthKey,
    pub records: Vec<AllocationRecord>,
    /// Ingestion timestamp
    pub timestamp: DateTime<Utc>,
    pub metadata: SnapshotMetadata,
}

impl MonthlySnapshot {
    /// Rebuild a snapshot from its stored entry
    pub fn from_entry(key: MonthKey, month_label: String, entry: SnapshotEntry) -> Self {
        Self {
            month_label,
            key,
            records: entry.data,
            timestamp: entry.timestamp,
            metadata: entry.metadata,
        }
    }

    /// Calendar days in the snapshot's month
    pub fn days_in_month(&self) -> u32 {
        self.key.days_in_month()
    }

    pub fn total_amount(&self) -> f64 {
        self.records.iter().map(|r| r.amount).sum()
    }

    pub fn total_days(&self) -> u64 {
        self.records.iter().map(|r| r.days as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storable_requires_equipment_and_positive_amount() {
        assert!(AllocationRecord::new("EX-65", 10, 1500.0).is_storable());
        assert!(!AllocationRecord::new("", 10, 1500.0).is_storable());
        assert!(!AllocationRecord::new("   ", 10, 1500.0).is_storable());
        assert!(!AllocationRecord::new("EX-65", 10, 0.0).is_storable());
        assert!(!AllocationRecord::new("EX-65", 10, -5.0).is_storable());
        assert!(!AllocationRecord::new("EX-65", 10, f64::NAN).is_storable());
    }

    #[test]
    fn test_blank_job_number_is_absent() {
        let record = AllocationRecord::new("EX-65", 1, 10.0).with_job("  ");
        assert_eq!(record.job(), None);
        let record = AllocationRecord::new("EX-65", 1, 10.0).with_job("J-100");
        assert_eq!(record.job(), Some("J-100"));
    }

    #[test]
    fn test_record_deserializes_with_optional_fields_missing() {
        let json = r#"{"equipment_id": "DZ-12", "amount": 420.5}"#;
        let record: AllocationRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.equipment_id, "DZ-12");
        assert_eq!(record.days, 0);
        assert_eq!(record.job_number, None);
    }

    #[test]
    fn test_read_records_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("april.json");
        std::fs::write(
            &good,
            r#"[{"equipment_id": "EX-65", "job_number": "J-1", "days": 12, "amount": 3600.0}]"#,
        )
        .unwrap();
        let records = read_records_file(&good).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].job(), Some("J-1"));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{not json").unwrap();
        assert!(matches!(
            read_records_file(&bad),
            Err(CoreError::JsonParse { .. })
        ));
        assert!(matches!(
            read_records_file(&dir.path().join("missing.json")),
            Err(CoreError::FileRead { .. })
        ));
    }

    #[test]
    fn test_metadata_keeps_extra_fields() {
        let json = r#"{"source": "april.xlsx", "uploaded_by": "ops"}"#;
        let meta: SnapshotMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.source.as_deref(), Some("april.xlsx"));
        assert_eq!(meta.extra.get("uploaded_by").and_then(|v| v.as_str()), Some("ops"));
    }
}
