//! Allocation trend analytics
//!
//! Provides OLS trend fitting, next-period forecasting, per-dimension
//! analysis and fleet-wide summary reports over monthly snapshots.

pub mod dimension;
pub mod forecasting;
pub mod regression;
pub mod summary;
pub mod trends;


pub use dimension::{
    analyze_history, Dimension, DimensionAnalysis, DimensionAnalyzer, DimensionTrends,
    PeriodMetrics,
};
pub use forecasting::{forecast, SeriesAnalysis};
pub use regression::{fit_line, LinearFit};
pub use summary::{
    summarize, ChartOutcome, FleetTrends, MonthTotals, RankedEntry, SummaryReport,
    SummaryReportBuilder,
};
pub use trends::{calculate_trend, TrendDirection, TrendResult};

/// Months of data needed before trends and forecasts are reported
pub const MIN_TREND_PERIODS: usize = 2;

/// Default history window in months
pub const DEFAULT_HISTORY_MONTHS: usize = 6;
