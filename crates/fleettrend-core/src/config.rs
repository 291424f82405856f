//! Engine configuration
//!
//! Loaded from `<config_dir>/fleettrend/config.toml`. A missing file means
//! defaults; a malformed one is an error. The backend is chosen here, once,
//! and the resulting `SnapshotStore` is handed to the analyzers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::analytics::summary::DEFAULT_TOP_N;
use crate::analytics::{SummaryReportBuilder, DEFAULT_HISTORY_MONTHS};
use crate::error::CoreError;
use crate::export::CsvSeriesExporter;
use crate::store::{JsonFileBackend, SnapshotStore, SqliteBackend};

/// Storage backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sqlite,
    Json,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::Json => "json",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "db" => Ok(BackendKind::Sqlite),
            "json" | "file" => Ok(BackendKind::Json),
            other => Err(format!("unknown backend '{}' (expected sqlite or json)", other)),
        }
    }
}

/// Configuration for the trend engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Storage backend
    pub backend: BackendKind,

    /// Directory holding the database or JSON document
    pub data_dir: PathBuf,

    /// Default history window in months
    pub history_months: usize,

    /// Ranking length in summary reports
    pub top_n: usize,

    /// Where chart series are written; no chart hand-off when unset
    pub chart_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            data_dir: dirs::data_dir()
                .map(|d| d.join("fleettrend"))
                .unwrap_or_else(|| PathBuf::from(".fleettrend")),
            history_months: DEFAULT_HISTORY_MONTHS,
            top_n: DEFAULT_TOP_N,
            chart_dir: None,
        }
    }
}

impl EngineConfig {
    /// `<config_dir>/fleettrend/config.toml`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("fleettrend").join("config.toml"))
    }

    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| CoreError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| CoreError::InvalidConfig {
            message: format!("{}: {}", path.display(), e),
        })?;
        config.validate()?;

        debug!(path = %path.display(), backend = %config.backend, "Config loaded");
        Ok(config)
    }

    /// Persist as TOML
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let content = toml::to_string_pretty(self).map_err(|e| CoreError::InvalidConfig {
            message: format!("Failed to serialize config: {}", e),
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CoreError::FileWrite {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| CoreError::FileWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.history_months == 0 {
            return Err(CoreError::InvalidConfig {
                message: "history_months must be at least 1".to_string(),
            });
        }
        if self.top_n == 0 {
            return Err(CoreError::InvalidConfig {
                message: "top_n must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Open the configured backend and wrap it in a store
    pub fn open_store(&self) -> Result<SnapshotStore, CoreError> {
        let store = match self.backend {
            BackendKind::Sqlite => SnapshotStore::new(
                SqliteBackend::open_in_dir(&self.data_dir)
                    .map_err(|e| CoreError::storage("sqlite", &e))?,
            ),
            BackendKind::Json => SnapshotStore::new(
                JsonFileBackend::open_in_dir(&self.data_dir)
                    .map_err(|e| CoreError::storage("json", &e))?,
            ),
        };
        Ok(store)
    }

    /// Summary builder using this config's ranking length and chart directory
    pub fn summary_builder(&self, store: Arc<SnapshotStore>) -> SummaryReportBuilder {
        let builder = SummaryReportBuilder::new(store).with_top_n(self.top_n);
        match &self.chart_dir {
            Some(dir) => builder.with_exporter(Arc::new(CsvSeriesExporter::new(dir))),
            None => builder,
        }
    }
}
