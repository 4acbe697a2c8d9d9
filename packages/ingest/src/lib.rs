#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-domain ingestion of raw municipal sources into the spatial container.
//!
//! Each [`Domain`] selects one [`Ingestor`]. An ingestor discovers its
//! source files under the input root, decodes and repairs them, applies the
//! domain's field mapping and writes one or more normalized layers through
//! [`SpatialContainerStore`]. Problems with a single file or feature are
//! logged and collected in the returned [`IngestReport`]; only problems that
//! leave the domain without usable input are returned as [`IngestError`].

pub mod area;
pub mod building;
pub mod census;
pub mod common;
pub mod facility;
pub mod financial;
pub mod population;
pub mod transportation;
pub mod vacancy;
pub mod zone;

use std::fmt;
use std::path::{Path, PathBuf};

use plateau_stats_messages::{Message, label, tr};
use plateau_stats_models::{ErrorKind, Layer};
use plateau_stats_source::SourceError;
use plateau_stats_spatial::SpatialError;
use plateau_stats_store::{SpatialContainerStore, StoreError};
use strum_macros::{AsRefStr, EnumIter};

/// Errors that abort one domain's ingestion.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The domain folder holds no Shapefile at all.
    #[error("The Shapefile for {label} was not found.")]
    ShapefileNotFound {
        /// Display name of the dataset.
        label: String,
    },

    /// Shapefiles exist but none of them could be used.
    #[error("No valid {label} Shapefile was found.")]
    NoValidShapefile {
        /// Display name of the dataset.
        label: String,
    },

    /// A required non-Shapefile input is missing.
    #[error("{} was not found.", path.display())]
    FileNotFound {
        /// The missing file or folder.
        path: PathBuf,
    },

    /// A table that must have rows has none.
    #[error("{} contains no data rows", path.display())]
    EmptyTable {
        /// The empty table.
        path: PathBuf,
    },

    /// Reading a source failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The container rejected a read or write.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A geometry operation failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),
}

impl IngestError {
    /// Classifies this error in the shared taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ShapefileNotFound { .. }
            | Self::NoValidShapefile { .. }
            | Self::FileNotFound { .. } => ErrorKind::MissingInput,
            Self::EmptyTable { .. } => ErrorKind::Format,
            Self::Source(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::Spatial(e) => e.kind(),
        }
    }
}

/// Tunables shared by the ingestors.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOptions {
    /// Bus stop coverage radius in meters.
    pub bus_m: f64,
    /// Railway station coverage radius in meters.
    pub railway_m: f64,
    /// Shelter walking distance in meters.
    pub shelter_m: f64,
    /// Merge buffers of the same category into one feature.
    pub dissolve_buffers: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            bus_m: 300.0,
            railway_m: 800.0,
            shelter_m: 500.0,
            dissolve_buffers: true,
        }
    }
}

/// Where an ingestor reads from and how it is tuned.
#[derive(Debug, Clone)]
pub struct IngestContext {
    /// The input root holding one folder per dataset.
    pub input: PathBuf,
    /// Thresholds and toggles.
    pub options: IngestOptions,
}

impl IngestContext {
    /// Context with default options.
    #[must_use]
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            options: IngestOptions::default(),
        }
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: IngestOptions) -> Self {
        self.options = options;
        self
    }

    /// `relative` resolved against the input root.
    #[must_use]
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.input.join(relative)
    }
}

/// A file or feature that was left out, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skip {
    /// The file path or `layer#index` of the skipped item.
    pub item: String,
    /// Human-readable reason.
    pub reason: String,
    /// Classification of the reason.
    pub kind: ErrorKind,
}

/// What an ingestor wrote and what it had to leave out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Names of the layers written, in write order.
    pub layers: Vec<String>,
    /// Recoverable problems.
    pub skipped: Vec<Skip>,
}

impl IngestReport {
    /// Records a skipped item.
    pub fn skip(&mut self, item: impl fmt::Display, reason: impl fmt::Display, kind: ErrorKind) {
        self.skipped.push(Skip {
            item: item.to_string(),
            reason: reason.to_string(),
            kind,
        });
    }

    /// Appends another report.
    pub fn merge(&mut self, other: Self) {
        self.layers.extend(other.layers);
        self.skipped.extend(other.skipped);
    }

    /// Writes `layer` to the container and records its name.
    ///
    /// # Errors
    ///
    /// * [`IngestError::Store`] if the container rejects the write
    pub fn write(
        &mut self,
        store: &mut SpatialContainerStore,
        layer: &Layer,
    ) -> Result<(), IngestError> {
        store.add_layer(layer)?;
        self.layers.push(layer.name.clone());
        Ok(())
    }

    /// Like [`Self::write`] without listing the layer on the host panel.
    ///
    /// # Errors
    ///
    /// * [`IngestError::Store`] if the container rejects the write
    pub fn write_unlisted(
        &mut self,
        store: &mut SpatialContainerStore,
        layer: &Layer,
    ) -> Result<(), IngestError> {
        store.add_layer_unlisted(layer)?;
        self.layers.push(layer.name.clone());
        Ok(())
    }
}

/// One source domain's ingestion.
pub trait Ingestor: Send + Sync {
    /// The domain this ingestor handles.
    fn domain(&self) -> Domain;

    /// Reads the domain's sources under `ctx.input` and writes its layers.
    ///
    /// # Errors
    ///
    /// Returns an error when the domain has no usable input or the
    /// container cannot be written.
    fn ingest(
        &self,
        ctx: &IngestContext,
        store: &mut SpatialContainerStore,
    ) -> Result<IngestReport, IngestError>;
}

/// Source domains, in the order the pipeline runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Domain {
    /// `zones`.
    Zone,
    /// `vacancies`.
    Vacancy,
    /// `buildings`.
    Building,
    /// `meshes`, `population_target_settings`, `future_population`.
    Population,
    /// `facilities`.
    Facility,
    /// Road, railway, bus and traffic layers.
    Transportation,
    /// Buffers, planning areas and hazards.
    Area,
    /// `land_prices` and the land price columns of `meshes`.
    Financial,
}

impl Domain {
    /// The ingestor implementing this domain.
    #[must_use]
    pub fn ingestor(self) -> &'static dyn Ingestor {
        match self {
            Self::Zone => &zone::ZoneIngestor,
            Self::Vacancy => &vacancy::VacancyIngestor,
            Self::Building => &building::BuildingIngestor,
            Self::Population => &population::PopulationIngestor,
            Self::Facility => &facility::FacilityIngestor,
            Self::Transportation => &transportation::TransportationIngestor,
            Self::Area => &area::AreaIngestor,
            Self::Financial => &financial::FinancialIngestor,
        }
    }

    /// Localized display name used in messages.
    #[must_use]
    pub fn label(self) -> String {
        label(self.as_ref())
    }

    /// Runs this domain's ingestor and logs the completion message.
    ///
    /// # Errors
    ///
    /// Whatever the domain's [`Ingestor::ingest`] returns.
    pub fn run(
        self,
        ctx: &IngestContext,
        store: &mut SpatialContainerStore,
    ) -> Result<IngestReport, IngestError> {
        let report = self.ingestor().ingest(ctx, store)?;
        log::info!("{}", tr(Message::GenerationCompleted, &[&self.label()]));
        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::path::{Path, PathBuf};

    use encoding_rs::{Encoding, UTF_8};
    use geo::{Geometry, polygon};
    use plateau_stats_models::AttrValue;
    use plateau_stats_source::shp::ShapeType;
    use plateau_stats_source::write::{DbfField, write_shapefile};
    use plateau_stats_store::SpatialContainerStore;

    /// Creates an empty scratch directory unique to `name`.
    pub fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "plateau_stats_ingest_{name}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// A fresh container inside `dir`.
    pub fn store_in(dir: &Path) -> SpatialContainerStore {
        SpatialContainerStore::create(&dir.join("container.duckdb")).unwrap()
    }

    /// Axis-aligned rectangle polygon.
    pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1)
        ])
    }

    /// Writes a Shapefile under `dir/relative`, creating parent folders.
    pub fn shapefile(
        dir: &Path,
        relative: &str,
        shape_type: ShapeType,
        shapes: Vec<Geometry<f64>>,
        fields: &[DbfField],
        rows: &[Vec<AttrValue>],
    ) {
        shapefile_encoded(dir, relative, shape_type, shapes, fields, rows, UTF_8);
    }

    /// Like [`shapefile`] with an explicit DBF encoding.
    pub fn shapefile_encoded(
        dir: &Path,
        relative: &str,
        shape_type: ShapeType,
        shapes: Vec<Geometry<f64>>,
        fields: &[DbfField],
        rows: &[Vec<AttrValue>],
        encoding: &'static Encoding,
    ) {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let shapes: Vec<Option<Geometry<f64>>> = shapes.into_iter().map(Some).collect();
        write_shapefile(&path, shape_type, &shapes, fields, rows, encoding).unwrap();
    }

    /// The zone square used by most domain tests: (0,0)-(1,1).
    pub fn seed_zones(store: &mut SpatialContainerStore) {
        use plateau_stats_models::{Feature, GeometryKind, Layer};

        let mut zones = Layer::new("zones", GeometryKind::Polygon);
        zones.push(
            Feature::new(rect(0.0, 0.0, 1.0, 1.0))
                .with("key_code", "1")
                .with("city", "Sample"),
        );
        store.add_layer(&zones).unwrap();
    }
}
