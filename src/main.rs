//! CLI entry point for the KM Master recommender.
//!
//! Loads the operational, Master Zona and reference tables, runs the
//! KM Master → KM Tempuh → Master Zona cascade and writes the
//! recommendation reports.

use anyhow::{Context, Result, ensure};
use clap::{Args, Parser, Subcommand};
use km_master_recommender::cascade::Cascade;
use km_master_recommender::config::CascadeConfig;
use km_master_recommender::loader::{InputPaths, Loader};
use km_master_recommender::output::{RunSummary, print_json, write_reports};
use std::ffi::OsStr;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "km_master_recommender")]
#[command(about = "Recommend KM Master corrections for manual validation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// Operational trips CSV (OP, Toko, KM Tempuh, KM Master, KM Max)
    #[arg(long)]
    operational: String,

    /// Master Zona CSV (OP, Toko, KM Master, Kode Zona, Provinsi, Status Toko)
    #[arg(long)]
    master_zona: String,

    /// "Rekomendasi KM Master" override CSV (OP, Toko, Rekomendasi KM Master)
    #[arg(long)]
    reference: String,

    /// Zona reference CSV (Kode Zona, KM Zona)
    #[arg(long)]
    zona: String,

    /// Field delimiter shared by all input files
    #[arg(long, default_value_t = ',')]
    delimiter: char,
}

impl InputArgs {
    fn loader(&self) -> Result<Loader> {
        ensure!(
            self.delimiter.is_ascii(),
            "delimiter must be a single ASCII character, got '{}'",
            self.delimiter
        );
        Ok(Loader::new(self.delimiter as u8))
    }

    fn paths(&self) -> InputPaths {
        InputPaths {
            operational: self.operational.clone(),
            master_zona: self.master_zona.clone(),
            reference: self.reference.clone(),
            zona: self.zona.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the rule cascade and write recommendation reports
    Recommend {
        #[command(flatten)]
        inputs: InputArgs,

        /// JSON file with thresholds; defaults are used when omitted
        #[arg(short, long)]
        config: Option<String>,

        /// Directory for recommendations.csv, unresolved.csv and summary.json
        #[arg(short = 'd', long, default_value = "output")]
        output_dir: String,
    },
    /// Load the inputs and report excluded rows without running the cascade
    Validate {
        #[command(flatten)]
        inputs: InputArgs,
    },
    /// Print the effective configuration as JSON
    ShowConfig {
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/km_master_recommender.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("km_master_recommender.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Recommend {
            inputs,
            config,
            output_dir,
        } => {
            recommend(&inputs, config.as_deref(), Path::new(&output_dir))?;
        }
        Commands::Validate { inputs } => {
            let snapshot = inputs
                .loader()?
                .load(&inputs.paths())
                .context("failed to load input tables")?;

            for exclusion in &snapshot.excluded {
                warn!(origin = %exclusion.origin, error = %exclusion.error, "Excluded");
            }
            info!(
                stores = snapshot.store.len(),
                reference_entries = snapshot.refs.km_master.len(),
                zones = snapshot.refs.zona.len(),
                excluded = snapshot.excluded.len(),
                "Validation summary"
            );
        }
        Commands::ShowConfig { config } => {
            let config = CascadeConfig::load_or_default(config.as_deref())?;
            print_json(&config)?;
        }
    }

    Ok(())
}

/// Loads the snapshot, runs the cascade and writes every report.
#[tracing::instrument(skip(inputs, config_path))]
fn recommend(inputs: &InputArgs, config_path: Option<&str>, output_dir: &Path) -> Result<()> {
    let config = CascadeConfig::load_or_default(config_path)?;
    info!(?config, "Configuration loaded");

    let snapshot = inputs
        .loader()?
        .load(&inputs.paths())
        .context("failed to load input tables")?;

    let report = Cascade::new(&config)?.run(&snapshot.store, &snapshot.refs);
    let summary = RunSummary::new(&report, &snapshot.excluded, &config);

    write_reports(output_dir, &report, &summary)?;

    info!(
        evaluated = summary.evaluated,
        km_master = summary.km_master,
        km_tempuh = summary.km_tempuh,
        master_zona = summary.master_zona,
        unresolved = summary.unresolved,
        excluded = summary.excluded,
        "Run summary"
    );
    if summary.unresolved > 0 {
        warn!(
            unresolved = summary.unresolved,
            "Stores need manual review, see unresolved.csv"
        );
    }

    Ok(())
}
