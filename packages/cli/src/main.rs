#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the GPS deformation analysis engine.
//!
//! Uses `indicatif-log-bridge` (via [`gps_deform_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and the stage bar never fight for the terminal. Reports are
//! written to stdout as JSON.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gps_deform_engine::{AnalysisView, EngineConfig};

/// Env var naming a TOML config file when `--config` is not given.
const CONFIG_ENV: &str = "GPS_DEFORM_CONFIG";

#[derive(Parser)]
#[command(name = "gps_deform", about = "GPS deformation analysis and forecasting")]
struct Cli {
    /// TOML file overriding the built-in configuration (falls back to
    /// `GPS_DEFORM_CONFIG`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse the fixes of one device read from a JSON file
    Analyze {
        /// JSON array of position fixes
        #[arg(long)]
        input: PathBuf,
        /// Device the fixes belong to
        #[arg(long)]
        device: String,
        /// Surveyed baseline latitude. Without a surveyed baseline the
        /// earliest fixes are averaged.
        #[arg(long, requires = "baseline_lon")]
        baseline_lat: Option<f64>,
        /// Surveyed baseline longitude
        #[arg(long, requires = "baseline_lat")]
        baseline_lon: Option<f64>,
        /// Report projection: summary, trend or full
        #[arg(long, default_value = "summary")]
        view: AnalysisView,
        /// Most recent fixes to analyse
        #[arg(long, default_value = "200")]
        limit: usize,
    },
    /// Analyse a generated drifting station. The data is synthetic.
    Demo {
        /// Hourly fixes to generate
        #[arg(long, default_value = "60")]
        hours: u32,
        /// Eastward drift in millimetres per hour
        #[arg(long, default_value = "1.0")]
        drift_mm_per_hour: f64,
        /// Standard deviation of the noise in millimetres
        #[arg(long, default_value = "0.5")]
        noise_mm: f64,
        /// Report projection: summary, trend or full
        #[arg(long, default_value = "summary")]
        view: AnalysisView,
    },
    /// Print the temporary baseline the earliest fixes in a JSON file yield
    Baseline {
        /// JSON array of position fixes
        #[arg(long)]
        input: PathBuf,
    },
    /// Print the effective configuration as TOML
    Config,
}

fn load_config(path: Option<PathBuf>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let path = path.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    match path {
        Some(path) => {
            log::info!("Loading configuration from {}", path.display());
            Ok(EngineConfig::load(&path)?)
        }
        None => Ok(EngineConfig::embedded()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = gps_deform_cli_utils::init_logger();
    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Analyze {
            input,
            device,
            baseline_lat,
            baseline_lon,
            view,
            limit,
        } => {
            let baseline = baseline_lat.zip(baseline_lon);
            commands::analyze(&multi, config, &input, &device, baseline, view, limit).await?;
        }
        Commands::Demo {
            hours,
            drift_mm_per_hour,
            noise_mm,
            view,
        } => {
            commands::demo(&multi, config, hours, drift_mm_per_hour, noise_mm, view).await?;
        }
        Commands::Baseline { input } => commands::baseline(&input)?,
        Commands::Config => print!("{}", config.to_toml_string()?),
    }

    Ok(())
}
