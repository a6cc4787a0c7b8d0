mod axis;
mod config;
mod database;
mod harvest;
mod jobscript;
mod mpi;
mod report;
mod schedulers;
mod sweep;
mod sysinfo;
mod workspace;

use clap::Parser;
use config::SweepConfig;
use harvest::OutputHarvester;
use hpcsweep_analysis::aggregate;
use report::SweepReport;
use schedulers::Schedulers;
use std::{path::PathBuf, process::exit};
use sweep::{kind::SweepKind, SweepDriver};
use sysinfo::SystemInfo;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Parameter sweep performance testing on batch clusters
#[derive(Parser, Debug)]
#[command(name = "hpcsweep", author, version, about)]
struct Cli {
    /// Sweep configuration, YAML or JSON
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Write the full result report to this YAML file
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Store the results in this SQLite database, overrides `database.path`
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Free text stored along with the sweep
    #[arg(long)]
    comment: Option<String>,

    /// Report host and tool versions before sweeping
    #[arg(long)]
    system_info: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match SweepConfig::load(&cli.config) {
        Ok(config) => config,
        Err(error) => {
            error!(error = ?error, "{error}");
            exit(1)
        }
    };

    if config.preflight_checks() {
        error!("Configuration {:?} contains errors, aborting", cli.config);
        exit(1)
    }

    if cli.system_info {
        SystemInfo::collect(&config).log();
    }

    let kind = match SweepKind::resolve(&config) {
        Ok(kind) => kind,
        Err(error) => {
            error!(error = ?error, "{error}");
            exit(1)
        }
    };
    let scheduler = Schedulers::load(&config.scheduler);
    let mut driver = match SweepDriver::new(&config, kind) {
        Ok(driver) => driver,
        Err(error) => {
            error!(error = ?error, "{error}");
            exit(1)
        }
    };

    info!(
        "Starting {} sweep with {} points and {} repetitions each",
        config.test.sweep,
        driver.kind().total(),
        config.test.repetitions()
    );

    let runs = match driver.run(&scheduler) {
        Ok(runs) => runs,
        Err(error) => {
            error!(error = ?error, "Sweep failed: {error}");
            exit(1)
        }
    };
    info!("Collected {} usable runs", runs.len());

    // pattern was validated in the preflight checks
    let pattern = match config.test.metric_pattern() {
        Ok(pattern) => pattern,
        Err(error) => {
            error!(error = ?error, "{error}");
            exit(1)
        }
    };
    let harvester = OutputHarvester::new(&scheduler, &pattern, config.ingest.poll_settings());
    let aggregation = aggregate(&runs, config.test.selection, &harvester);

    let report = SweepReport::new(&config, driver.kind(), aggregation, cli.comment);
    report.log_summary();

    let mut failed = false;

    if let Some(path) = cli.report {
        if let Err(error) = report.write_yaml(&path) {
            error!(error = ?error, "{error}");
            failed = true;
        }
    }

    let database_path = cli
        .database
        .or_else(|| config.database.as_ref().map(|database| database.path.clone()));
    if let Some(path) = database_path {
        match database::persist(&path, &report) {
            Ok(id) => info!(id = id, "Stored sweep in {path:?}"),
            Err(error) => {
                error!(error = ?error, "Failed to store results: {error}");
                failed = true;
            }
        }
    }

    if failed {
        exit(1)
    }
}
