//! fleettrend-core - Core library for fleettrend
//!
//! Stores monthly equipment-to-job allocation snapshots and computes trends,
//! forecasts and ranked summaries over them.

pub mod analytics;
pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod store;

pub use analytics::{
    Dimension, DimensionAnalysis, DimensionAnalyzer, SummaryReport, SummaryReportBuilder,
    TrendDirection, TrendResult,
};
pub use config::{BackendKind, EngineConfig};
pub use error::{CoreError, LoadReport};
pub use export::{ChartExporter, ChartSeries, CsvSeriesExporter};
pub use models::{AllocationRecord, MonthKey, MonthlySnapshot, SnapshotMetadata};
pub use store::{History, PutReceipt, SnapshotBackend, SnapshotStore};
