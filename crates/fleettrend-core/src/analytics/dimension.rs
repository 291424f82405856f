//! Per-equipment and per-job analysis across monthly snapshots
//!
//! Months where the dimension has no records contribute no data point.
//! They are not filled with zeros: a missing month and a zero month are
//! different things to the caller.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use super::forecasting::SeriesAnalysis;
use super::trends::{calculate_trend, TrendResult};
use super::MIN_TREND_PERIODS;
use crate::error::LoadReport;
use crate::models::{AllocationRecord, MonthKey, MonthlySnapshot};
use crate::store::{History, SnapshotStore};

/// Cost-code bucket for records without one
pub const UNCODED: &str = "UNCODED";

/// Axis along which records are filtered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Equipment,
    Job,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Equipment => "equipment",
            Dimension::Job => "job",
        }
    }

    /// Does `record` belong to `id` along this dimension
    fn matches(&self, record: &AllocationRecord, id: &str) -> bool {
        match self {
            Dimension::Equipment => record.equipment() == id,
            Dimension::Job => record.job() == Some(id),
        }
    }

    /// The other side of the assignment: job for equipment, equipment for job
    fn counterpart<'a>(&self, record: &'a AllocationRecord) -> Option<&'a str> {
        match self {
            Dimension::Equipment => record.job(),
            Dimension::Job => Some(record.equipment()),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equipment" => Ok(Dimension::Equipment),
            "job" => Ok(Dimension::Job),
            other => Err(format!(
                "unknown dimension '{}' (expected equipment or job)",
                other
            )),
        }
    }
}

/// Metrics for one month in which the dimension has records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodMetrics {
    pub month_label: String,
    pub key: MonthKey,
    pub total_days: u64,
    pub total_amount: f64,
    /// Allocated days / calendar days in the month
    pub utilization_rate: f64,
    /// Distinct jobs touched
    pub job_count: usize,
    /// Distinct equipment involved
    pub equipment_count: usize,
    /// Cost code -> summed amount
    pub cost_codes: BTreeMap<String, f64>,
    /// Counterpart id -> summed amount (jobs for equipment, equipment for jobs)
    pub breakdown: BTreeMap<String, f64>,
    pub record_count: usize,
}

impl PeriodMetrics {
    /// Aggregate the matching records of one snapshot, `None` if there are none
    fn collect(snapshot: &MonthlySnapshot, id: &str, dimension: Dimension) -> Option<Self> {
        let matching: Vec<&AllocationRecord> = snapshot
            .records
            .iter()
            .filter(|r| dimension.matches(r, id))
            .collect();
        if matching.is_empty() {
            return None;
        }

        let mut jobs = BTreeSet::new();
        let mut equipment = BTreeSet::new();
        let mut cost_codes: BTreeMap<String, f64> = BTreeMap::new();
        let mut breakdown: BTreeMap<String, f64> = BTreeMap::new();
        let mut total_days = 0u64;
        let mut total_amount = 0.0;

        for record in &matching {
            total_days += record.days as u64;
            total_amount += record.amount;
            equipment.insert(record.equipment());
            if let Some(job) = record.job() {
                jobs.insert(job);
            }

            let code = record
                .cost_code
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(UNCODED);
            *cost_codes.entry(code.to_string()).or_default() += record.amount;

            if let Some(other) = dimension.counterpart(record) {
                *breakdown.entry(other.to_string()).or_default() += record.amount;
            }
        }

        let days_in_month = snapshot.days_in_month();
        Some(Self {
            month_label: snapshot.month_label.clone(),
            key: snapshot.key,
            total_days,
            total_amount,
            utilization_rate: total_days as f64 / days_in_month as f64,
            job_count: jobs.len(),
            equipment_count: equipment.len(),
            cost_codes,
            breakdown,
            record_count: matching.len(),
        })
    }
}

/// Trends and forecasts over the months with data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionTrends {
    pub days: SeriesAnalysis,
    pub amount: SeriesAnalysis,
    pub utilization: SeriesAnalysis,
    /// Distinct-job series, equipment queries only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_count: Option<SeriesAnalysis>,
    /// Distinct-equipment series, job queries only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipment_count: Option<SeriesAnalysis>,
    /// Per cost code, for codes with a non-zero series
    pub cost_codes: BTreeMap<String, TrendResult>,
    /// Per counterpart amount series
    pub breakdown: BTreeMap<String, SeriesAnalysis>,
}

/// Result of analyzing one equipment id or job number
#[derive(Debug, Clone, Serialize)]
pub struct DimensionAnalysis {
    pub dimension_id: String,
    pub dimension: Dimension,
    pub months_requested: usize,
    /// Snapshots read from the store (with or without data for this id)
    pub months_scanned: usize,
    /// Months with data, oldest first
    pub periods: Vec<PeriodMetrics>,
    /// Fewer than 2 months of data: no trends are reported
    pub insufficient_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trends: Option<DimensionTrends>,
    pub report: LoadReport,
}

impl DimensionAnalysis {
    pub fn month_labels(&self) -> Vec<String> {
        self.periods.iter().map(|p| p.month_label.clone()).collect()
    }

    pub fn days_series(&self) -> Vec<f64> {
        self.series(|p| p.total_days as f64)
    }

    pub fn amount_series(&self) -> Vec<f64> {
        self.series(|p| p.total_amount)
    }

    pub fn utilization_series(&self) -> Vec<f64> {
        self.series(|p| p.utilization_rate)
    }

    fn series(&self, f: impl Fn(&PeriodMetrics) -> f64) -> Vec<f64> {
        self.periods.iter().map(f).collect()
    }

    /// Values of a keyed breakdown aligned to the periods, 0 where absent
    fn aligned(
        &self,
        key: &str,
        pick: impl Fn(&PeriodMetrics) -> &BTreeMap<String, f64>,
    ) -> Vec<f64> {
        self.periods
            .iter()
            .map(|p| pick(p).get(key).copied().unwrap_or(0.0))
            .collect()
    }

    fn compute_trends(&self) -> DimensionTrends {
        let job_counts = self.series(|p| p.job_count as f64);
        let equipment_counts = self.series(|p| p.equipment_count as f64);

        let codes: BTreeSet<&String> = self
            .periods
            .iter()
            .flat_map(|p| p.cost_codes.keys())
            .collect();
        let cost_codes = codes
            .into_iter()
            .filter_map(|code| {
                let values = self.aligned(code, |p| &p.cost_codes);
                values
                    .iter()
                    .any(|&v| v != 0.0)
                    .then(|| (code.clone(), calculate_trend(&values)))
            })
            .collect();

        let counterparts: BTreeSet<&String> =
            self.periods.iter().flat_map(|p| p.breakdown.keys()).collect();
        let breakdown = counterparts
            .into_iter()
            .map(|other| {
                let values = self.aligned(other, |p| &p.breakdown);
                (other.clone(), SeriesAnalysis::of(&values))
            })
            .collect();

        DimensionTrends {
            days: SeriesAnalysis::of(&self.days_series()),
            amount: SeriesAnalysis::of(&self.amount_series()),
            utilization: SeriesAnalysis::of(&self.utilization_series()),
            job_count: (self.dimension == Dimension::Equipment)
                .then(|| SeriesAnalysis::of(&job_counts)),
            equipment_count: (self.dimension == Dimension::Job)
                .then(|| SeriesAnalysis::of(&equipment_counts)),
            cost_codes,
            breakdown,
        }
    }
}

/// Analyze a history read for one dimension id
///
/// Pure over the snapshots; `DimensionAnalyzer::analyze` is the store-backed entry point.
pub fn analyze_history(
    history: &History,
    dimension_id: &str,
    dimension: Dimension,
    months: usize,
) -> DimensionAnalysis {
    let dimension_id = dimension_id.trim();
    let window = &history.snapshots[..history.len().min(months)];
    let periods: Vec<PeriodMetrics> = window
        .iter()
        .rev()
        .filter_map(|snapshot| PeriodMetrics::collect(snapshot, dimension_id, dimension))
        .collect();

    let mut analysis = DimensionAnalysis {
        dimension_id: dimension_id.to_string(),
        dimension,
        months_requested: months,
        months_scanned: window.len(),
        insufficient_data: periods.len() < MIN_TREND_PERIODS,
        periods,
        trends: None,
        report: history.report.clone(),
    };

    if !analysis.insufficient_data {
        analysis.trends = Some(analysis.compute_trends());
    }

    debug!(
        id = dimension_id,
        dimension = %dimension,
        periods = analysis.periods.len(),
        insufficient_data = analysis.insufficient_data,
        "Dimension analyzed"
    );

    analysis
}

/// Store-backed dimension analysis
pub struct DimensionAnalyzer {
    store: Arc<SnapshotStore>,
}

impl DimensionAnalyzer {
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        Self { store }
    }

    /// Analyze `dimension_id` over the last `months` snapshots
    pub fn analyze(
        &self,
        dimension_id: &str,
        dimension: Dimension,
        months: usize,
    ) -> DimensionAnalysis {
        let history = self.store.get_history(months);
        analyze_history(&history, dimension_id, dimension, months)
    }
}
