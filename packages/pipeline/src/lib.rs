#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The end-to-end run: container, ingestion, building assignment,
//! indicators and the CSV archive.
//!
//! [`PipelineWorker`] executes the [`Stage`]s strictly in order. Between
//! stages it polls its [`CancellationToken`]; a canceled run keeps every
//! layer committed so far. Errors in a required stage, and persistence
//! errors anywhere, end the run as [`PipelineState::Failed`]. Other stage
//! errors are recorded in that stage's [`StageReport`] and the run goes on.

pub mod cancel;
pub mod config;
pub mod stage;
pub mod worker;

use std::path::PathBuf;

use plateau_stats_assign::AssignError;
use plateau_stats_ingest::{Domain, IngestError};
use plateau_stats_metrics::MetricError;
use plateau_stats_models::ErrorKind;
use plateau_stats_store::StoreError;

pub use cancel::CancellationToken;
pub use config::{ConfigError, PipelineConfig, is_distance};
pub use stage::{Stage, StageReport};
pub use worker::{PipelineHandle, PipelineState, PipelineSummary, PipelineWorker};

/// Errors that end a stage.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// An ingestion domain failed.
    #[error("{}: {source}", domain.label())]
    Ingest {
        /// The domain being ingested.
        domain: Domain,
        /// What went wrong.
        #[source]
        source: IngestError,
    },

    /// Building assignment failed.
    #[error(transparent)]
    Assign(#[from] AssignError),

    /// An indicator or the archive failed.
    #[error(transparent)]
    Metric(#[from] MetricError),

    /// The container could not be created or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The output folder could not be prepared.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Folder being created.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A stage ran before the container existed.
    #[error("The container was not initialized.")]
    NoContainer,

    /// The worker thread panicked or was aborted.
    #[error("Pipeline worker stopped unexpectedly: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// Classifies this error in the shared taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Ingest { source, .. } => source.kind(),
            Self::Assign(e) => e.kind(),
            Self::Metric(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::Io { .. } | Self::NoContainer | Self::Join(_) => ErrorKind::Persistence,
        }
    }
}
