//! Terminal rendering for history, analysis and summary output

use comfy_table::{Cell, Color, ContentArrangement, Table};
use fleettrend_core::analytics::{
    ChartOutcome, DimensionAnalysis, RankedEntry, SeriesAnalysis, SummaryReport, TrendDirection,
    TrendResult,
};
use fleettrend_core::error::{ErrorSeverity, LoadReport};
use fleettrend_core::store::History;

// ============================================================================
// Formatting helpers
// ============================================================================

/// Format an amount with thousands separators and 2 decimals
pub fn format_amount(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let (whole, frac) = (cents.abs() / 100, cents.abs() % 100);

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if cents < 0 { "-" } else { "" };
    format!("{}{}.{:02}", sign, grouped, frac)
}

/// One-line trend description, e.g. "↑ up +25.0% (r² 0.93)"
pub fn format_trend(trend: &TrendResult) -> String {
    match trend.direction {
        TrendDirection::Error => format!(
            "! error: {}",
            trend.error.as_deref().unwrap_or("unknown")
        ),
        direction => {
            let arrow = match direction {
                TrendDirection::Up => "↑ up",
                TrendDirection::Down => "↓ down",
                _ => "→ neutral",
            };
            format!(
                "{} {:+.1}% (r² {:.2})",
                arrow,
                trend.magnitude * 100.0,
                trend.confidence
            )
        }
    }
}

fn header(table: &mut Table, columns: &[&str], no_color: bool) {
    if no_color {
        table.set_header(columns.to_vec());
    } else {
        table.set_header(
            columns
                .iter()
                .map(|c| Cell::new(c).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );
    }
}

fn new_table() -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Lines describing read problems, failures before skipped data
pub fn report_lines(report: &LoadReport) -> Vec<String> {
    if !report.has_errors() {
        return Vec::new();
    }

    let (warnings, errors, fatal) = report.error_count();
    let mut lines = vec![format!(
        "Load issues: {} warning(s), {} error(s), {} fatal",
        warnings, errors, fatal
    )];
    lines.extend(
        report
            .errors
            .iter()
            .filter(|e| e.severity != ErrorSeverity::Warning)
            .map(|e| format!("  ! {}: {}", e.source, e.message)),
    );
    lines.extend(
        report
            .warnings()
            .map(|w| format!("  - {}: {}", w.source, w.message)),
    );
    lines
}

fn print_report_warnings(report: &LoadReport) {
    let lines = report_lines(report);
    if lines.is_empty() {
        return;
    }
    println!();
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// History
// ============================================================================

pub fn print_history(history: &History, no_color: bool) {
    if history.is_empty() {
        println!("No snapshots stored");
        print_report_warnings(&history.report);
        return;
    }

    let mut table = new_table();
    header(
        &mut table,
        &["Month", "Records", "Amount", "Days", "Source", "Ingested (UTC)"],
        no_color,
    );

    for snapshot in &history.snapshots {
        table.add_row(vec![
            snapshot.month_label.clone(),
            snapshot.records.len().to_string(),
            format_amount(snapshot.total_amount()),
            snapshot.total_days().to_string(),
            snapshot
                .metadata
                .source
                .clone()
                .unwrap_or_else(|| "-".to_string()),
            snapshot.timestamp.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }

    println!("{table}");
    print_report_warnings(&history.report);
}

// ============================================================================
// Dimension analysis
// ============================================================================

fn series_row(name: &str, analysis: &SeriesAnalysis, precision: usize) -> Vec<String> {
    vec![
        name.to_string(),
        format_trend(&analysis.trend),
        format!("{:.*}", precision, analysis.forecast),
    ]
}

pub fn print_analysis(analysis: &DimensionAnalysis, no_color: bool) {
    println!(
        "{} {} ({} of {} months with data)",
        analysis.dimension,
        analysis.dimension_id,
        analysis.periods.len(),
        analysis.months_scanned
    );
    println!();

    if analysis.periods.is_empty() {
        println!("No allocations found");
        print_report_warnings(&analysis.report);
        return;
    }

    let mut table = new_table();
    header(
        &mut table,
        &["Month", "Days", "Amount", "Utilization", "Jobs", "Equipment", "Cost codes"],
        no_color,
    );
    for period in &analysis.periods {
        table.add_row(vec![
            period.month_label.clone(),
            period.total_days.to_string(),
            format_amount(period.total_amount),
            format!("{:.1}%", period.utilization_rate * 100.0),
            period.job_count.to_string(),
            period.equipment_count.to_string(),
            period.cost_codes.len().to_string(),
        ]);
    }
    println!("{table}");
    println!();

    let Some(trends) = &analysis.trends else {
        println!("Insufficient data: at least 2 months are needed for trends and forecasts");
        print_report_warnings(&analysis.report);
        return;
    };

    let mut table = new_table();
    header(&mut table, &["Series", "Trend", "Next month"], no_color);
    table.add_row(series_row("days", &trends.days, 1));
    table.add_row(series_row("amount", &trends.amount, 2));
    table.add_row(series_row("utilization", &trends.utilization, 3));
    if let Some(jobs) = &trends.job_count {
        table.add_row(series_row("job count", jobs, 1));
    }
    if let Some(equipment) = &trends.equipment_count {
        table.add_row(series_row("equipment count", equipment, 1));
    }
    for (other, series) in &trends.breakdown {
        table.add_row(series_row(&format!("amount @ {}", other), series, 2));
    }
    for (code, trend) in &trends.cost_codes {
        table.add_row(vec![format!("cost code {}", code), format_trend(trend), "-".to_string()]);
    }
    println!("{table}");

    print_report_warnings(&analysis.report);
}

// ============================================================================
// Summary
// ============================================================================

fn ranking_table(title: &str, entries: &[RankedEntry], no_color: bool) {
    println!("{}", title);
    let mut table = new_table();
    header(&mut table, &["#", "ID", "Name", "Amount", "Days", "Months"], no_color);
    for (rank, entry) in entries.iter().enumerate() {
        table.add_row(vec![
            (rank + 1).to_string(),
            entry.id.clone(),
            entry.name.clone().unwrap_or_else(|| "-".to_string()),
            format_amount(entry.total_amount),
            entry.total_days.to_string(),
            entry.months_active.to_string(),
        ]);
    }
    println!("{table}");
    println!();
}

pub fn print_summary(report: &SummaryReport, no_color: bool) {
    println!("fleettrend - Fleet Allocation Summary");
    println!("=====================================");
    println!();
    println!(
        "Months:           {} (requested {})",
        report.months.len(),
        report.months_requested
    );
    println!("Equipment:        {}", report.total_equipment);
    println!("Jobs:             {}", report.total_jobs);
    println!("Total Amount:     {}", format_amount(report.total_amount));
    println!("Total Days:       {}", report.total_days);
    println!();

    if report.months.is_empty() {
        println!("No snapshots in window");
        print_report_warnings(&report.report);
        return;
    }

    let mut table = new_table();
    header(&mut table, &["Month", "Amount", "Days", "Equipment", "Jobs"], no_color);
    for month in &report.months {
        table.add_row(vec![
            month.month_label.clone(),
            format_amount(month.total_amount),
            month.total_days.to_string(),
            month.equipment_count.to_string(),
            month.job_count.to_string(),
        ]);
    }
    println!("{table}");
    println!();

    ranking_table("Top equipment", &report.top_equipment, no_color);
    ranking_table("Top jobs", &report.top_jobs, no_color);

    match &report.trends {
        Some(trends) => {
            let mut table = new_table();
            header(&mut table, &["Fleet series", "Trend", "Next month"], no_color);
            table.add_row(series_row("amount", &trends.amount, 2));
            table.add_row(series_row("days", &trends.days, 1));
            table.add_row(series_row("equipment count", &trends.equipment_count, 1));
            table.add_row(series_row("job count", &trends.job_count, 1));
            println!("{table}");
        }
        None => println!("Insufficient data: at least 2 months are needed for fleet trends"),
    }

    match &report.chart {
        ChartOutcome::Rendered { path } => println!("\nChart data: {}", path.display()),
        ChartOutcome::Failed { message } => println!("\nChart export failed: {}", message),
        ChartOutcome::Skipped => {}
    }

    print_report_warnings(&report.report);
}
