//! Export of reports and chart series
//!
//! Chart rendering itself is an external collaborator: this module defines
//! the `ChartExporter` seam it plugs into, plus CSV/JSON writers for the
//! numeric series and reports.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::analytics::{DimensionAnalysis, SummaryReport};

/// One named series of values, aligned with `ChartSeries::labels`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedSeries {
    pub name: String,
    pub values: Vec<f64>,
}

/// Month labels plus the series to plot against them
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub title: String,
    pub labels: Vec<String>,
    pub series: Vec<NamedSeries>,
}

impl ChartSeries {
    pub fn new(title: impl Into<String>, labels: Vec<String>) -> Self {
        Self {
            title: title.into(),
            labels,
            series: Vec::new(),
        }
    }

    pub fn with_series(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.series.push(NamedSeries {
            name: name.into(),
            values,
        });
        self
    }
}

/// Renders chart series to an artifact (image, data file, ...)
///
/// Returns the path of the produced artifact. Callers treat failure as
/// non-fatal.
pub trait ChartExporter: Send + Sync {
    fn export(&self, chart: &ChartSeries) -> Result<PathBuf>;
}

/// Writes chart series as CSV for an external renderer to pick up
pub struct CsvSeriesExporter {
    output_dir: PathBuf,
}

impl CsvSeriesExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// File name derived from the chart title ("Fleet trend" -> fleet-trend.csv)
    fn file_name(title: &str) -> String {
        let slug: String = title
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();
        let slug = slug
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        if slug.is_empty() {
            "chart.csv".to_string()
        } else {
            format!("{}.csv", slug)
        }
    }
}

impl ChartExporter for CsvSeriesExporter {
    fn export(&self, chart: &ChartSeries) -> Result<PathBuf> {
        let path = self.output_dir.join(Self::file_name(&chart.title));
        export_chart_series_to_csv(chart, &path)?;
        Ok(path)
    }
}

fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let file = File::create(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Export chart series to CSV
///
/// CSV columns: Month, then one column per series.
/// Rows follow `labels` order (oldest first).
pub fn export_chart_series_to_csv(chart: &ChartSeries, path: &Path) -> Result<()> {
    let mut writer = create_writer(path)?;

    let mut header = vec!["Month".to_string()];
    header.extend(chart.series.iter().map(|s| s.name.clone()));
    writeln!(writer, "{}", header.join(",")).context("Failed to write CSV header")?;

    for (idx, label) in chart.labels.iter().enumerate() {
        let mut row = vec![format!("\"{}\"", label)];
        row.extend(chart.series.iter().map(|s| {
            s.values
                .get(idx)
                .map(|v| format!("{:.2}", v))
                .unwrap_or_default()
        }));
        writeln!(writer, "{}", row.join(","))
            .with_context(|| format!("Failed to write row for {}", label))?;
    }

    writer.flush().context("Failed to flush CSV writer")?;
    Ok(())
}

/// Export per-month fleet totals to CSV
///
/// CSV columns: Month, Amount, Days, Equipment, Jobs, Records
/// Rows sorted chronologically (oldest first)
pub fn export_summary_to_csv(report: &SummaryReport, path: &Path) -> Result<()> {
    let mut writer = create_writer(path)?;

    writeln!(writer, "Month,Amount,Days,Equipment,Jobs,Records")
        .context("Failed to write CSV header")?;

    for month in &report.months {
        writeln!(
            writer,
            "\"{}\",{:.2},{},{},{},{}",
            month.month_label,
            month.total_amount,
            month.total_days,
            month.equipment_count,
            month.job_count,
            month.record_count
        )
        .with_context(|| format!("Failed to write row for {}", month.month_label))?;
    }

    writer.flush().context("Failed to flush CSV writer")?;
    Ok(())
}

fn write_json<T: Serialize>(value: &T, path: &Path, what: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {} to JSON", what))?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write JSON file: {}", path.display()))
}

/// Export a summary report to pretty-printed JSON
pub fn export_summary_to_json(report: &SummaryReport, path: &Path) -> Result<()> {
    write_json(report, path, "summary report")
}

/// Export a dimension analysis to pretty-printed JSON
pub fn export_analysis_to_json(analysis: &DimensionAnalysis, path: &Path) -> Result<()> {
    write_json(analysis, path, "dimension analysis")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_chart() -> ChartSeries {
        ChartSeries::new(
            "Fleet allocation trend",
            vec!["March 2025".to_string(), "April 2025".to_string()],
        )
        .with_series("amount", vec![1200.0, 1500.5])
        .with_series("days", vec![20.0, 24.0])
    }

    #[test]
    fn test_chart_series_csv_layout() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("chart.csv");

        export_chart_series_to_csv(&sample_chart(), &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Month,amount,days");
        assert_eq!(lines[1], "\"March 2025\",1200.00,20.00");
        assert_eq!(lines[2], "\"April 2025\",1500.50,24.00");
    }

    #[test]
    fn test_csv_exporter_names_file_from_title() {
        let temp_dir = TempDir::new().unwrap();
        let exporter = CsvSeriesExporter::new(temp_dir.path().join("charts"));

        let path = exporter.export(&sample_chart()).unwrap();

        assert_eq!(path.file_name().unwrap(), "fleet-allocation-trend.csv");
        assert!(path.exists());
    }

    #[test]
    fn test_file_name_fallback() {
        assert_eq!(CsvSeriesExporter::file_name("!!!"), "chart.csv");
        assert_eq!(CsvSeriesExporter::file_name("EX-65 / Days"), "ex-65-days.csv");
    }
}
