//! The `run` command: resolves the configuration, runs the pipeline on a
//! blocking worker and prints what every stage did.

use std::path::PathBuf;

use clap::Args;
use plateau_stats_cli_utils::{IndicatifProgress, MultiProgress};
use plateau_stats_messages::{Locale, set_locale};
use plateau_stats_models::Year;
use plateau_stats_pipeline::{
    PipelineConfig, PipelineError, PipelineState, PipelineWorker, is_distance,
};

use crate::DEFAULT_CONFIG;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Configuration file; missing or malformed files fall back to defaults
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Root of the input folders
    #[arg(long)]
    input: Option<PathBuf>,

    /// Folder receiving the container, CSV files and archive
    #[arg(long)]
    output: Option<PathBuf>,

    /// Bus stop reach in meters
    #[arg(long, value_parser = meters)]
    bus: Option<f64>,

    /// Railway station reach in meters
    #[arg(long, value_parser = meters)]
    railway: Option<f64>,

    /// Shelter reach in meters
    #[arg(long, value_parser = meters)]
    shelter: Option<f64>,

    /// Keep one buffer per point instead of dissolving them
    #[arg(long)]
    no_dissolve: bool,

    /// Do not bundle the CSV files into a zip
    #[arg(long)]
    no_archive: bool,

    /// Message language (en, ja)
    #[arg(long)]
    locale: Option<Locale>,

    /// Only export these years (comma-separated)
    #[arg(long, value_delimiter = ',')]
    years: Vec<u16>,
}

fn meters(text: &str) -> Result<f64, String> {
    match text.parse::<f64>() {
        Ok(value) if is_distance(&value) => Ok(value),
        _ => Err(format!("{text:?} is not a positive distance in meters")),
    }
}

impl RunArgs {
    /// Reads the configuration file and lets the flags override it.
    fn resolve(self) -> PipelineConfig {
        let mut config = PipelineConfig::load_or_default(&self.config);

        if let Some(input) = self.input {
            config.input = input;
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if let Some(bus) = self.bus {
            config.bus_m = bus;
        }
        if let Some(railway) = self.railway {
            config.railway_m = railway;
        }
        if let Some(shelter) = self.shelter {
            config.shelter_m = shelter;
        }
        if self.no_dissolve {
            config.dissolve_buffers = false;
        }
        if self.no_archive {
            config.archive = false;
        }
        if let Some(locale) = self.locale {
            config.locale = locale;
        }
        if !self.years.is_empty() {
            config.years = self.years.into_iter().map(Year).collect();
        }

        config
    }
}

/// Runs the whole pipeline. Ctrl-C cancels between stages.
///
/// # Errors
///
/// * If the run ends as [`PipelineState::Failed`]
/// * If the worker thread stops unexpectedly
pub async fn run(multi: &MultiProgress, args: RunArgs) -> Result<(), PipelineError> {
    let config = args.resolve();
    set_locale(config.locale);

    log::info!(
        "Input: {}, output: {}",
        config.input.display(),
        config.output.display()
    );

    let progress = IndicatifProgress::percent_bar(multi, "Starting");
    let handle = PipelineWorker::new(config).with_progress(progress).start();

    let token = handle.token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, stopping after the current stage");
            token.cancel();
        }
    });

    let summary = handle.wait().await;
    interrupt.abort();
    let summary = summary?;

    println!();
    println!("{:<28} {:>7} {:>6} {:>8}", "STAGE", "LAYERS", "FILES", "SKIPPED");
    println!("{}", "-".repeat(52));
    for report in &summary.reports {
        println!(
            "{:<28} {:>7} {:>6} {:>8}",
            report.stage.as_ref(),
            report.layers.len(),
            report.files.len(),
            report.skipped.len()
        );
        for skip in &report.skipped {
            println!("    skipped {}: {}", skip.item, skip.reason);
        }
    }
    if let Some(path) = &summary.archive {
        println!("\nArchive: {}", path.display());
    }
    println!("\nState: {}", summary.state);

    match (summary.state, summary.error) {
        (PipelineState::Failed, Some(error)) => Err(error),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distances_must_be_positive_and_finite() {
        assert_eq!(meters("450"), Ok(450.0));
        assert!(meters("0").is_err());
        assert!(meters("-1").is_err());
        assert!(meters("NaN").is_err());
        assert!(meters("far").is_err());
    }
}
