//! fleettrend - Equipment allocation trend engine

mod cli;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fleettrend_core::analytics::{Dimension, DimensionAnalyzer};
use fleettrend_core::export::{
    export_analysis_to_json, export_summary_to_csv, export_summary_to_json,
};
use fleettrend_core::models::{read_records_file, SnapshotMetadata};
use fleettrend_core::{BackendKind, EngineConfig, SnapshotStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "fleettrend",
    version,
    about = "Equipment allocation trend engine",
    long_about = "Stores one allocation snapshot per month and reports trends, forecasts\n\
                  and ranked summaries over the stored history.\n\
                  \n\
                  Examples:\n\
                    fleettrend ingest \"April 2025\" april.json    # Store a month\n\
                    fleettrend history -n 12                      # List stored months\n\
                    fleettrend analyze EX-65                      # Equipment trends\n\
                    fleettrend analyze J-104 --dimension job      # Job trends\n\
                    fleettrend summary --months 6 --top 5         # Fleet summary\n\
                  \n\
                  Environment Variables:\n\
                    FLEETTREND_CONFIG                # Config file path\n\
                    FLEETTREND_DATA_DIR              # Override data directory\n\
                    FLEETTREND_BACKEND               # Override backend: sqlite|json\n\
                    FLEETTREND_NO_COLOR              # Disable ANSI colors\n\
                    RUST_LOG                         # Log filter (default: fleettrend=info)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: <config_dir>/fleettrend/config.toml)
    #[arg(long, env = "FLEETTREND_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the snapshot store
    #[arg(long, env = "FLEETTREND_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Storage backend
    #[arg(long, env = "FLEETTREND_BACKEND")]
    backend: Option<BackendKind>,

    /// Disable ANSI colors (log-friendly)
    #[arg(long, env = "FLEETTREND_NO_COLOR")]
    no_color: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum DimensionArg {
    Equipment,
    Job,
}

impl From<DimensionArg> for Dimension {
    fn from(arg: DimensionArg) -> Self {
        match arg {
            DimensionArg::Equipment => Dimension::Equipment,
            DimensionArg::Job => Dimension::Job,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Store the allocation records for a month, replacing any previous snapshot
    Ingest {
        /// Month label, e.g. "April 2025"
        month: String,
        /// JSON file holding an array of allocation records
        file: PathBuf,
        /// Source recorded in snapshot metadata (default: file name)
        #[arg(long)]
        source: Option<String>,
    },
    /// List stored snapshots, newest first
    History {
        /// Number of months
        #[arg(long, short = 'n')]
        months: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Trends and forecasts for one equipment unit or job
    Analyze {
        /// Equipment id or job number
        id: String,
        /// What the id refers to
        #[arg(long, short = 'd', value_enum, default_value = "equipment")]
        dimension: DimensionArg,
        /// History window in months
        #[arg(long, short = 'n')]
        months: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Also write the analysis as JSON to this file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Fleet-wide summary with rankings and trends
    Summary {
        /// History window in months
        #[arg(long, short = 'n')]
        months: Option<usize>,
        /// Ranking length
        #[arg(long)]
        top: Option<usize>,
        /// Directory for chart series CSV
        #[arg(long)]
        chart_dir: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Write the report to a file (.csv for monthly totals, JSON otherwise)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Delete the snapshot for a month
    Remove {
        /// Month label, e.g. "April 2025"
        month: String,
    },
    /// Show or write the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "fleettrend=info".into()))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config_path = cli
        .config
        .clone()
        .or_else(EngineConfig::default_path)
        .context("Could not determine config file location")?;

    let mut config = EngineConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    let no_color = cli.no_color;

    match cli.command {
        Command::Config { init } => run_config(&config, config_path, init),
        Command::Ingest {
            month,
            file,
            source,
        } => run_ingest(&config, month, file, source),
        Command::History { months, json } => run_history(&config, months, json, no_color),
        Command::Analyze {
            id,
            dimension,
            months,
            json,
            output,
        } => run_analyze(&config, id, dimension.into(), months, json, output, no_color),
        Command::Summary {
            months,
            top,
            chart_dir,
            json,
            output,
        } => {
            if let Some(top) = top {
                config.top_n = top;
            }
            if chart_dir.is_some() {
                config.chart_dir = chart_dir;
            }
            config.validate()?;
            run_summary(&config, months, json, output, no_color)
        }
        Command::Remove { month } => run_remove(&config, month),
    }
}

fn open_store(config: &EngineConfig) -> Result<Arc<SnapshotStore>> {
    let store = config.open_store().with_context(|| {
        format!(
            "Failed to open {} store in {}",
            config.backend,
            config.data_dir.display()
        )
    })?;
    Ok(Arc::new(store))
}

/// Window from the flag or the config default; zero is rejected
fn window(config: &EngineConfig, months: Option<usize>) -> Result<usize> {
    match months.unwrap_or(config.history_months) {
        0 => bail!("--months must be at least 1"),
        n => Ok(n),
    }
}

fn run_config(config: &EngineConfig, path: PathBuf, init: bool) -> Result<()> {
    if init {
        config
            .save(&path)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        println!("Config written to {}", path.display());
        return Ok(());
    }

    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(config).context("Failed to render config")?);
    Ok(())
}

fn run_ingest(
    config: &EngineConfig,
    month: String,
    file: PathBuf,
    source: Option<String>,
) -> Result<()> {
    let records = read_records_file(&file)?;
    let source = source.unwrap_or_else(|| {
        file.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string())
    });

    let store = open_store(config)?;
    let receipt = store
        .try_put(&month, records, SnapshotMetadata::from_source(source))
        .with_context(|| format!("Failed to store snapshot for '{}'", month))?;

    println!(
        "Stored {} records for {} ({} dropped)",
        receipt.stored, receipt.month_label, receipt.dropped
    );
    Ok(())
}

fn run_history(
    config: &EngineConfig,
    months: Option<usize>,
    json: bool,
    no_color: bool,
) -> Result<()> {
    let months = window(config, months)?;
    let history = open_store(config)?.get_history(months);

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
    } else {
        cli::print_history(&history, no_color);
    }
    Ok(())
}

fn run_analyze(
    config: &EngineConfig,
    id: String,
    dimension: Dimension,
    months: Option<usize>,
    json: bool,
    output: Option<PathBuf>,
    no_color: bool,
) -> Result<()> {
    let months = window(config, months)?;
    let analysis = DimensionAnalyzer::new(open_store(config)?).analyze(&id, dimension, months);

    if let Some(path) = &output {
        export_analysis_to_json(&analysis, path)?;
        eprintln!("Analysis written to {}", path.display());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        cli::print_analysis(&analysis, no_color);
    }
    Ok(())
}

fn run_summary(
    config: &EngineConfig,
    months: Option<usize>,
    json: bool,
    output: Option<PathBuf>,
    no_color: bool,
) -> Result<()> {
    let months = window(config, months)?;
    let report = config.summary_builder(open_store(config)?).build(months);

    if let Some(path) = &output {
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            export_summary_to_csv(&report, path)?;
        } else {
            export_summary_to_json(&report, path)?;
        }
        eprintln!("Summary written to {}", path.display());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        cli::print_summary(&report, no_color);
    }
    Ok(())
}

fn run_remove(config: &EngineConfig, month: String) -> Result<()> {
    if open_store(config)?.remove(&month) {
        println!("Removed snapshot for {}", month);
    } else {
        println!("No snapshot removed for {}", month);
    }
    Ok(())
}
