//! Error types for fleettrend-core
//!
//! Hard failures are `CoreError`. Partial failures during history reads are
//! collected in a `LoadReport` so reports degrade instead of aborting.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for fleettrend operations
#[derive(Error, Debug)]
pub enum CoreError {
    // ===================
    // IO Errors
    // ===================
    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ===================
    // Parse Errors
    // ===================
    #[error("Failed to parse JSON in {path}: {message}")]
    JsonParse {
        path: PathBuf,
        message: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid month label '{label}' (expected e.g. \"April 2025\")")]
    InvalidMonthLabel { label: String },

    // ===================
    // Store Errors
    // ===================
    #[error("Storage failure in {backend} backend: {message}")]
    Storage {
        backend: &'static str,
        message: String,
    },

    // ===================
    // Config Errors
    // ===================
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl CoreError {
    /// Wrap a backend failure, keeping the full context chain in the message
    pub fn storage(backend: &'static str, error: &anyhow::Error) -> Self {
        CoreError::Storage {
            backend,
            message: format!("{:#}", error),
        }
    }
}

/// Severity level for errors during load
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Non-critical, data skipped but the read went on
    Warning,
    /// Significant but not fatal
    Error,
    /// Nothing could be read
    Fatal,
}

/// Individual error entry in load report
#[derive(Debug, Clone, serde::Serialize)]
pub struct LoadError {
    pub source: String,
    pub message: String,
    pub severity: ErrorSeverity,
}

impl LoadError {
    pub fn warning(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            severity: ErrorSeverity::Warning,
        }
    }

    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            severity: ErrorSeverity::Error,
        }
    }

    pub fn fatal(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            severity: ErrorSeverity::Fatal,
        }
    }
}

/// Report of problems encountered while reading snapshot history
///
/// Enables graceful degradation by tracking partial failures
/// instead of failing completely on any error.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct LoadReport {
    pub errors: Vec<LoadError>,
    /// Snapshots successfully read
    pub snapshots_loaded: usize,
    /// Stored labels that could not be parsed as a month
    pub labels_skipped: Vec<String>,
}

impl LoadReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: LoadError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, source: impl Into<String>, message: impl Into<String>) {
        self.errors.push(LoadError::warning(source, message));
    }

    pub fn add_fatal(&mut self, source: impl Into<String>, message: impl Into<String>) {
        self.errors.push(LoadError::fatal(source, message));
    }

    /// Record a stored label that is not a valid month
    pub fn skip_label(&mut self, label: impl Into<String>) {
        let label = label.into();
        self.add_warning("history", format!("Skipping malformed month label '{}'", label));
        self.labels_skipped.push(label);
    }

    /// Returns true if there are any fatal errors
    pub fn has_fatal_errors(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.severity == ErrorSeverity::Fatal)
    }

    /// Returns true if there are any errors (including warnings)
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns only warnings
    pub fn warnings(&self) -> impl Iterator<Item = &LoadError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ErrorSeverity::Warning)
    }

    /// Returns count by severity
    pub fn error_count(&self) -> (usize, usize, usize) {
        let count = |severity| self.errors.iter().filter(|e| e.severity == severity).count();
        (
            count(ErrorSeverity::Warning),
            count(ErrorSeverity::Error),
            count(ErrorSeverity::Fatal),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_report_severity_counting() {
        let mut report = LoadReport::new();
        report.add_warning("history", "label skipped");
        report.add_error(LoadError::error("json", "entry unreadable"));
        report.add_fatal("sqlite", "database locked");

        let (warnings, errors, fatal) = report.error_count();
        assert_eq!(warnings, 1);
        assert_eq!(errors, 1);
        assert_eq!(fatal, 1);
        assert!(report.has_fatal_errors());
    }

    #[test]
    fn test_skip_label_records_warning() {
        let mut report = LoadReport::new();
        report.skip_label("Blorf 2025");

        assert_eq!(report.labels_skipped, vec!["Blorf 2025".to_string()]);
        assert_eq!(report.warnings().count(), 1);
        assert!(!report.has_fatal_errors());
    }

    #[test]
    fn test_storage_error_keeps_context_chain() {
        let inner = anyhow::anyhow!("disk full").context("Failed to write snapshot");
        let err = CoreError::storage("json", &inner);
        let text = err.to_string();
        assert!(text.contains("json backend"));
        assert!(text.contains("disk full"));
    }
}
