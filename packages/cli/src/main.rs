#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command line entry point for plateau-stats.
//!
//! Uses `indicatif-log-bridge` (via [`plateau_stats_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and the pipeline progress bar never fight for the terminal.

mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use plateau_stats_pipeline::PipelineConfig;
use plateau_stats_store::SpatialContainerStore;

use crate::pipeline::RunArgs;

/// Configuration file read when `--config` is not given.
const DEFAULT_CONFIG: &str = "plateau_stats.xml";

#[derive(Parser)]
#[command(
    name = "plateau_stats",
    about = "Urban structure evaluation indicators from PLATEAU and municipal open data"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest every input, assign building data and write the indicator CSVs
    Run(RunArgs),
    /// Bundle the CSV files of a folder into a timestamped zip
    Archive {
        /// Folder holding the exported CSV files
        folder: PathBuf,
    },
    /// List the layers of a container with their feature counts
    Layers {
        /// Container file (defaults to the configured one)
        #[arg(long)]
        container: Option<PathBuf>,
        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = plateau_stats_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => pipeline::run(&multi, args).await?,
        Commands::Archive { folder } => {
            let path = plateau_stats_metrics::archive::archive_folder(&folder)?;
            println!("{}", path.display());
        }
        Commands::Layers { container, config } => {
            let path = container.unwrap_or_else(|| {
                PipelineConfig::load_or_default(
                    &config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG)),
                )
                .container_path()
            });
            let store = SpatialContainerStore::open(&path)?;
            println!("{:<40} FEATURES", "LAYER");
            println!("{}", "-".repeat(50));
            for (name, count) in store.layer_summaries()? {
                println!("{name:<40} {count}");
            }
        }
    }

    Ok(())
}
