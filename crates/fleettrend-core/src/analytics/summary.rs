//! Fleet-wide summary over the most recent snapshots
//!
//! Rankings, per-month totals, aligned per-equipment/per-job series and
//! fleet trends. The chart hand-off is best effort: an exporter failure is
//! recorded on the report, never raised.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::forecasting::SeriesAnalysis;
use super::MIN_TREND_PERIODS;
use crate::error::LoadReport;
use crate::export::{ChartExporter, ChartSeries};
use crate::models::MonthKey;
use crate::store::{History, SnapshotStore};

/// Default number of entries in each ranking
pub const DEFAULT_TOP_N: usize = 10;

/// Totals for one month across the whole fleet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthTotals {
    pub month_label: String,
    pub key: MonthKey,
    pub total_amount: f64,
    pub total_days: u64,
    pub equipment_count: usize,
    pub job_count: usize,
    pub record_count: usize,
}

/// One entry of a top-N ranking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    pub id: String,
    /// Job name for jobs, equipment type for equipment (first seen)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub total_amount: f64,
    pub total_days: u64,
    /// Months in the window with at least one record
    pub months_active: usize,
}

/// Trends over the fleet-wide monthly series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetTrends {
    pub amount: SeriesAnalysis,
    pub days: SeriesAnalysis,
    pub equipment_count: SeriesAnalysis,
    pub job_count: SeriesAnalysis,
}

/// What happened to the chart hand-off
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ChartOutcome {
    /// No exporter configured, or nothing to chart
    Skipped,
    Rendered { path: std::path::PathBuf },
    Failed { message: String },
}

/// Read-time projection over the last N snapshots
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub months_requested: usize,
    /// Months in the window, oldest first
    pub months: Vec<MonthTotals>,
    pub total_equipment: usize,
    pub total_jobs: usize,
    pub total_amount: f64,
    pub total_days: u64,
    pub top_equipment: Vec<RankedEntry>,
    pub top_jobs: Vec<RankedEntry>,
    /// Amount per month for every equipment id, aligned to `months`
    pub equipment_series: BTreeMap<String, Vec<f64>>,
    /// Amount per month for every job number, aligned to `months`
    pub job_series: BTreeMap<String, Vec<f64>>,
    /// Fewer than 2 months in the window: no fleet trends
    pub insufficient_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trends: Option<FleetTrends>,
    pub chart: ChartOutcome,
    pub report: LoadReport,
    pub generated_at: DateTime<Utc>,
}

impl SummaryReport {
    pub fn month_labels(&self) -> Vec<String> {
        self.months.iter().map(|m| m.month_label.clone()).collect()
    }

    pub fn amount_series(&self) -> Vec<f64> {
        self.months.iter().map(|m| m.total_amount).collect()
    }

    pub fn days_series(&self) -> Vec<f64> {
        self.months.iter().map(|m| m.total_days as f64).collect()
    }

    pub fn equipment_count_series(&self) -> Vec<f64> {
        self.months.iter().map(|m| m.equipment_count as f64).collect()
    }

    pub fn job_count_series(&self) -> Vec<f64> {
        self.months.iter().map(|m| m.job_count as f64).collect()
    }

    /// Fleet series in the shape the chart collaborator consumes
    pub fn chart_series(&self) -> ChartSeries {
        ChartSeries::new("Fleet allocation trend", self.month_labels())
            .with_series("amount", self.amount_series())
            .with_series("days", self.days_series())
            .with_series("equipment_count", self.equipment_count_series())
            .with_series("job_count", self.job_count_series())
    }
}

/// Running totals for one equipment id or job number
#[derive(Default)]
struct Accumulator {
    name: Option<String>,
    total_amount: f64,
    total_days: u64,
    /// Month index -> amount
    by_month: BTreeMap<usize, f64>,
}

impl Accumulator {
    fn add(&mut self, month_idx: usize, amount: f64, days: u32, name: Option<&str>) {
        self.total_amount += amount;
        self.total_days += days as u64;
        *self.by_month.entry(month_idx).or_default() += amount;
        if self.name.is_none() {
            self.name = name.map(str::to_string);
        }
    }

    fn aligned(&self, months: usize) -> Vec<f64> {
        (0..months)
            .map(|i| self.by_month.get(&i).copied().unwrap_or(0.0))
            .collect()
    }
}

/// Highest total amount first; equal amounts fall back to id order
fn rank(accumulators: &BTreeMap<String, Accumulator>, top_n: usize) -> Vec<RankedEntry> {
    let mut entries: Vec<RankedEntry> = accumulators
        .iter()
        .map(|(id, acc)| RankedEntry {
            id: id.clone(),
            name: acc.name.clone(),
            total_amount: acc.total_amount,
            total_days: acc.total_days,
            months_active: acc.by_month.len(),
        })
        .collect();

    entries.sort_by(|a, b| {
        b.total_amount
            .total_cmp(&a.total_amount)
            .then_with(|| a.id.cmp(&b.id))
    });
    entries.truncate(top_n);
    entries
}

/// Build a summary from a history read (no chart hand-off)
pub fn summarize(history: &History, months: usize, top_n: usize) -> SummaryReport {
    let newest = &history.snapshots[..history.len().min(months)];
    let mut month_totals = Vec::with_capacity(newest.len());
    let mut equipment: BTreeMap<String, Accumulator> = BTreeMap::new();
    let mut jobs: BTreeMap<String, Accumulator> = BTreeMap::new();

    for (idx, snapshot) in newest.iter().rev().enumerate() {
        let mut month_equipment = BTreeSet::new();
        let mut month_jobs = BTreeSet::new();

        for record in &snapshot.records {
            month_equipment.insert(record.equipment());
            equipment
                .entry(record.equipment().to_string())
                .or_default()
                .add(idx, record.amount, record.days, record.equipment_type.as_deref());

            if let Some(job) = record.job() {
                month_jobs.insert(job);
                jobs.entry(job.to_string()).or_default().add(
                    idx,
                    record.amount,
                    record.days,
                    record.job_name.as_deref(),
                );
            }
        }

        month_totals.push(MonthTotals {
            month_label: snapshot.month_label.clone(),
            key: snapshot.key,
            total_amount: snapshot.total_amount(),
            total_days: snapshot.total_days(),
            equipment_count: month_equipment.len(),
            job_count: month_jobs.len(),
            record_count: snapshot.records.len(),
        });
    }

    let window = month_totals.len();
    let mut report = SummaryReport {
        months_requested: months,
        total_equipment: equipment.len(),
        total_jobs: jobs.len(),
        total_amount: month_totals.iter().map(|m| m.total_amount).sum(),
        total_days: month_totals.iter().map(|m| m.total_days).sum(),
        top_equipment: rank(&equipment, top_n),
        top_jobs: rank(&jobs, top_n),
        equipment_series: equipment
            .iter()
            .map(|(id, acc)| (id.clone(), acc.aligned(window)))
            .collect(),
        job_series: jobs
            .iter()
            .map(|(id, acc)| (id.clone(), acc.aligned(window)))
            .collect(),
        months: month_totals,
        insufficient_data: window < MIN_TREND_PERIODS,
        trends: None,
        chart: ChartOutcome::Skipped,
        report: history.report.clone(),
        generated_at: Utc::now(),
    };

    if !report.insufficient_data {
        report.trends = Some(FleetTrends {
            amount: SeriesAnalysis::of(&report.amount_series()),
            days: SeriesAnalysis::of(&report.days_series()),
            equipment_count: SeriesAnalysis::of(&report.equipment_count_series()),
            job_count: SeriesAnalysis::of(&report.job_count_series()),
        });
    }

    debug!(
        months = window,
        equipment = report.total_equipment,
        jobs = report.total_jobs,
        "Summary computed"
    );

    report
}

/// Store-backed summary builder with an optional chart collaborator
pub struct SummaryReportBuilder {
    store: Arc<SnapshotStore>,
    top_n: usize,
    exporter: Option<Arc<dyn ChartExporter>>,
}

impl SummaryReportBuilder {
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        Self {
            store,
            top_n: DEFAULT_TOP_N,
            exporter: None,
        }
    }

    /// Ranking length (default 10)
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Hand the fleet series to `exporter` after each build
    pub fn with_exporter(mut self, exporter: Arc<dyn ChartExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Summarize the last `months` snapshots
    pub fn build(&self, months: usize) -> SummaryReport {
        let history = self.store.get_history(months);
        let mut report = summarize(&history, months, self.top_n);

        report.chart = match &self.exporter {
            Some(exporter) if !report.months.is_empty() => {
                match exporter.export(&report.chart_series()) {
                    Ok(path) => {
                        info!(path = %path.display(), "Chart series exported");
                        ChartOutcome::Rendered { path }
                    }
                    Err(e) => {
                        warn!(
                            error = %format!("{:#}", e),
                            "Chart export failed, continuing without chart"
                        );
                        ChartOutcome::Failed {
                            message: format!("{:#}", e),
                        }
                    }
                }
            }
            _ => ChartOutcome::Skipped,
        };

        report
    }
}
