//! The worker that runs every stage in order on a blocking thread.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use plateau_stats_ingest::IngestContext;
use plateau_stats_messages::{Message, tr};
use plateau_stats_metrics::archive;
use plateau_stats_models::{ErrorKind, MetricTable};
use plateau_stats_source::progress::{ProgressCallback, null_progress};
use plateau_stats_store::{LayerPanel, SpatialContainerStore};
use strum::IntoEnumIterator;
use strum_macros::Display;

use crate::cancel::CancellationToken;
use crate::config::PipelineConfig;
use crate::stage::{Stage, StageReport};
use crate::PipelineError;

/// Lifecycle of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PipelineState {
    /// Not started.
    Idle,
    /// Executing stages.
    Running,
    /// Every stage ran.
    Completed,
    /// Stopped at a stage boundary on request.
    Canceled,
    /// A fatal error aborted the run.
    Failed,
}

impl PipelineState {
    /// Whether the run has ended.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled | Self::Failed)
    }
}

/// Result of a finished run.
#[derive(Debug)]
pub struct PipelineSummary {
    /// Final state.
    pub state: PipelineState,
    /// One report per stage that ran, in order.
    pub reports: Vec<StageReport>,
    /// Indicator tables, including those whose export failed.
    pub tables: Vec<MetricTable>,
    /// The archive, when one was written.
    pub archive: Option<PathBuf>,
    /// The error that failed the run.
    pub error: Option<PipelineError>,
}

impl PipelineSummary {
    const fn new() -> Self {
        Self {
            state: PipelineState::Running,
            reports: Vec::new(),
            tables: Vec::new(),
            archive: None,
            error: None,
        }
    }

    /// Report of `stage`, if it ran.
    #[must_use]
    pub fn report(&self, stage: Stage) -> Option<&StageReport> {
        self.reports.iter().find(|r| r.stage == stage)
    }

    /// Every layer written, in stage order.
    #[must_use]
    pub fn layers(&self) -> Vec<&str> {
        self.reports
            .iter()
            .flat_map(|r| r.layers.iter().map(String::as_str))
            .collect()
    }
}

/// Runs ingestion, assignment, indicators and the archive in order.
pub struct PipelineWorker {
    config: PipelineConfig,
    token: CancellationToken,
    progress: Arc<dyn ProgressCallback>,
    panel: Option<Box<dyn LayerPanel>>,
    state: Arc<Mutex<PipelineState>>,
}

impl PipelineWorker {
    /// A worker for `config` with no progress display or layer panel.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            token: CancellationToken::new(),
            progress: null_progress(),
            panel: None,
            state: Arc::new(Mutex::new(PipelineState::Idle)),
        }
    }

    /// Reports stage percentages to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Lists written layers on `panel`.
    #[must_use]
    pub fn with_panel(mut self, panel: impl LayerPanel + 'static) -> Self {
        self.panel = Some(Box::new(panel));
        self
    }

    /// Uses `token` instead of a fresh one.
    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// The token that cancels this worker.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves the worker onto a blocking thread and returns its handle.
    #[must_use]
    pub fn start(mut self) -> PipelineHandle {
        let token = self.token.clone();
        let state = Arc::clone(&self.state);
        let join = tokio::task::spawn_blocking(move || self.run());
        PipelineHandle { token, state, join }
    }

    /// Runs every stage on the current thread.
    pub fn run(&mut self) -> PipelineSummary {
        self.set_state(PipelineState::Running);
        self.progress.set_total(100);
        self.progress.set_message(tr(Message::Processing, &[]));

        let mut summary = PipelineSummary::new();
        let mut run = Run::default();

        for stage in Stage::iter() {
            if self.token.is_canceled() {
                let msg = tr(Message::ProcessingCanceled, &[]);
                log::info!("{msg}");
                self.progress.finish(msg);
                return self.finish(summary, PipelineState::Canceled);
            }
            if stage == Stage::Archive && !(self.config.archive && run.exported_all) {
                continue;
            }

            let label = stage.label();
            log::info!(
                "{}",
                tr(Message::StageStarted, &[&label, &stage.percent()])
            );
            let mut report = StageReport::new(stage);

            if let Err(e) = self.execute(stage, &mut run, &mut report, &mut summary) {
                if stage.is_required() || e.kind() == ErrorKind::Persistence {
                    let msg = tr(Message::ErrorOccurred, &[&e]);
                    log::error!("{msg}");
                    self.progress.finish(msg);
                    summary.reports.push(report);
                    summary.error = Some(e);
                    return self.finish(summary, PipelineState::Failed);
                }
                log::warn!("{}", tr(Message::ErrorOccurred, &[&e]));
                if stage.calculator().is_some() {
                    run.exported_all = false;
                }
                report.skip(&label, &e, e.kind());
            }

            if !report.skipped.is_empty() {
                log::warn!(
                    "{}",
                    tr(Message::StageRecovered, &[&label, &report.skipped.len()])
                );
            }
            summary.reports.push(report);
            self.progress.set_percent(stage.percent(), label);
        }

        let msg = tr(Message::ProcessingCompleted, &[]);
        log::info!("{msg}");
        self.progress.finish(msg);
        self.finish(summary, PipelineState::Completed)
    }

    fn execute(
        &mut self,
        stage: Stage,
        run: &mut Run,
        report: &mut StageReport,
        summary: &mut PipelineSummary,
    ) -> Result<(), PipelineError> {
        if stage == Stage::InitContainer {
            run.store = Some(self.init_container()?);
            return Ok(());
        }
        if stage == Stage::Archive {
            let path = archive::archive_folder(&self.config.output)?;
            report.files.push(path.display().to_string());
            summary.archive = Some(path);
            return Ok(());
        }

        let store = run.store.as_mut().ok_or(PipelineError::NoContainer)?;

        if let Some(domain) = stage.domain() {
            let ctx = IngestContext::new(&self.config.input)
                .with_options(self.config.ingest_options());
            let ingested = domain
                .run(&ctx, store)
                .map_err(|source| PipelineError::Ingest { domain, source })?;
            report.layers.extend(ingested.layers);
            report.skipped.extend(ingested.skipped);
            return Ok(());
        }

        if let Some(calculator) = stage.calculator() {
            let calculation = calculator.run(store, &self.config.output, &self.config.years)?;
            match calculation.exported {
                Ok(path) => report.files.push(path.display().to_string()),
                Err(e) => {
                    run.exported_all = false;
                    report.skip(calculator.file_name(), &e, e.kind());
                }
            }
            summary.tables.push(calculation.table);
            return Ok(());
        }

        let assigned = plateau_stats_assign::run(store)?;
        report.layers.push(plateau_stats_ingest::building::LAYER.to_string());
        if assigned.vacancies_missing {
            report.skip(
                plateau_stats_ingest::vacancy::LAYER,
                tr(Message::LayerNotFound, &[&plateau_stats_ingest::vacancy::LAYER]),
                ErrorKind::MissingInput,
            );
        }
        for year in assigned.years_without_vacancies {
            report.skip(
                year,
                tr(Message::NoVacancyPoints, &[&year]),
                ErrorKind::MissingInput,
            );
        }
        Ok(())
    }

    fn init_container(&mut self) -> Result<SpatialContainerStore, PipelineError> {
        let output = &self.config.output;
        std::fs::create_dir_all(output).map_err(|source| PipelineError::Io {
            path: output.clone(),
            source,
        })?;
        let path = self.config.container_path();
        let mut store = SpatialContainerStore::create(&path)?;
        if let Some(panel) = self.panel.take() {
            store = store.with_panel(panel);
        }
        Ok(store)
    }

    fn set_state(&self, state: PipelineState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn finish(&self, mut summary: PipelineSummary, state: PipelineState) -> PipelineSummary {
        self.set_state(state);
        summary.state = state;
        summary
    }
}

/// State carried between stages.
struct Run {
    store: Option<SpatialContainerStore>,
    exported_all: bool,
}

impl Default for Run {
    fn default() -> Self {
        Self {
            store: None,
            exported_all: true,
        }
    }
}

/// A worker running on a blocking thread.
pub struct PipelineHandle {
    token: CancellationToken,
    state: Arc<Mutex<PipelineState>>,
    join: tokio::task::JoinHandle<PipelineSummary>,
}

impl PipelineHandle {
    /// Requests cancellation at the next stage boundary.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The worker's token, e.g. for a Ctrl-C handler.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for the run to end.
    ///
    /// # Errors
    ///
    /// * [`PipelineError::Join`] if the worker thread panicked
    pub async fn wait(self) -> Result<PipelineSummary, PipelineError> {
        Ok(self.join.await?)
    }
}
