#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Evaluation indicators over the normalized layers.
//!
//! Every [`Calculator`] reads the layers it needs from the container,
//! aggregates building population (taken at each footprint's centroid) per
//! census year and returns one [`MetricTable`]. [`Calculator::run`] also
//! writes the table as CSV; an export failure is reported alongside the
//! table rather than discarding it.

pub mod archive;
pub mod context;
pub mod disaster;
pub mod export;
pub mod fiscal;
pub mod land_use;
pub mod public_transport;
pub mod residential;
pub mod urban_function;

use std::path::{Path, PathBuf};

use plateau_stats_messages::{Message, label, tr};
use plateau_stats_models::{ErrorKind, MetricTable, Year};
use plateau_stats_store::{SpatialContainerStore, StoreError};
use strum_macros::{AsRefStr, EnumIter};

/// Errors raised while computing or exporting indicators.
#[derive(Debug, thiserror::Error)]
pub enum MetricError {
    /// A layer the calculator depends on is not in the container.
    #[error("The {layer} layer was not found.")]
    LayerNotFound {
        /// The missing layer.
        layer: String,
    },

    /// The computed table has no rows.
    #[error("The data to export is empty.")]
    ExportEmpty {
        /// File that would have been written.
        file: String,
    },

    /// Writing CSV rows failed.
    #[error("An error occurred during file export: {}.", path.display())]
    Csv {
        /// Destination file.
        path: PathBuf,
        /// Underlying writer error.
        #[source]
        source: csv::Error,
    },

    /// A file system operation failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Writing the archive failed.
    #[error("Failed to write archive {}: {source}", path.display())]
    Zip {
        /// Archive being written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: zip::result::ZipError,
    },

    /// The folder to archive holds no CSV file.
    #[error("No CSV files were found in the selected folder: {}", folder.display())]
    NoCsvFiles {
        /// The folder searched.
        folder: PathBuf,
    },

    /// Reading the container failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MetricError {
    /// Classifies this error in the shared taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::LayerNotFound { .. } | Self::NoCsvFiles { .. } => ErrorKind::MissingInput,
            Self::ExportEmpty { .. } | Self::Csv { .. } | Self::Io { .. } | Self::Zip { .. } => {
                ErrorKind::Export
            }
            Self::Store(e) => e.kind(),
        }
    }
}

/// A computed table and the outcome of writing it.
#[derive(Debug)]
pub struct Calculation {
    /// The indicators, kept even when the export failed.
    pub table: MetricTable,
    /// Path of the written CSV, or why it was not written.
    pub exported: Result<PathBuf, MetricError>,
}

/// One indicator family.
pub trait MetricCalculator: Send + Sync {
    /// The calculator this implementation backs.
    fn calculator(&self) -> Calculator;

    /// Computes the indicators from the container's layers.
    ///
    /// # Errors
    ///
    /// * [`MetricError::LayerNotFound`] if a required layer is absent
    /// * [`MetricError::Store`] if a layer cannot be read
    fn calculate(&self, store: &SpatialContainerStore) -> Result<MetricTable, MetricError>;
}

/// Indicator families, in the order the pipeline runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, AsRefStr)]
pub enum Calculator {
    /// `IF101`, population inside the residential induction area.
    #[strum(serialize = "residential induction")]
    ResidentialInduction,
    /// `IF102`, population and facilities inside the urban function area.
    #[strum(serialize = "urban function induction")]
    UrbanFunctionInduction,
    /// `IF103`, population exposed to hazards and covered by shelters.
    #[strum(serialize = "disaster prevention")]
    DisasterPrevention,
    /// `IF104`, population within reach of stations and bus stops.
    #[strum(serialize = "public transport")]
    PublicTransport,
    /// `IF105`, vacant residential buildings.
    #[strum(serialize = "land use")]
    LandUse,
    /// `IF106`, land prices.
    #[strum(serialize = "fiscal")]
    Fiscal,
}

impl Calculator {
    /// The implementation of this family.
    #[must_use]
    pub fn implementation(self) -> &'static dyn MetricCalculator {
        match self {
            Self::ResidentialInduction => &residential::ResidentialInduction,
            Self::UrbanFunctionInduction => &urban_function::UrbanFunctionInduction,
            Self::DisasterPrevention => &disaster::DisasterPrevention,
            Self::PublicTransport => &public_transport::PublicTransport,
            Self::LandUse => &land_use::LandUse,
            Self::Fiscal => &fiscal::Fiscal,
        }
    }

    /// CSV file the table is written to.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::ResidentialInduction => "IF101_居住誘導区域関連評価指標ファイル.csv",
            Self::UrbanFunctionInduction => "IF102_都市機能誘導区域関連評価指標ファイル.csv",
            Self::DisasterPrevention => "IF103_防災関連評価指標ファイル.csv",
            Self::PublicTransport => "IF104_公共交通関連評価指標ファイル.csv",
            Self::LandUse => "IF105_土地利用関連評価指標ファイル.csv",
            Self::Fiscal => "IF106_財政関連評価指標ファイル.csv",
        }
    }

    /// Localized display name used in messages.
    #[must_use]
    pub fn label(self) -> String {
        label(self.as_ref())
    }

    /// An empty table named after this family.
    #[must_use]
    pub fn table(self, unit: &str) -> MetricTable {
        MetricTable::new(unit, self.file_name())
    }

    /// Computes the table, keeps only `years` (all when empty) and writes it
    /// under `output`.
    ///
    /// # Errors
    ///
    /// Whatever [`MetricCalculator::calculate`] returns. Export problems are
    /// reported in [`Calculation::exported`] instead.
    pub fn run(
        self,
        store: &SpatialContainerStore,
        output: &Path,
        years: &[Year],
    ) -> Result<Calculation, MetricError> {
        let mut table = self.implementation().calculate(store)?;
        if !years.is_empty() {
            table.rows.retain(|row| years.contains(&row.year));
        }
        let exported = export::write_csv(&table, output);
        if exported.is_ok() {
            log::info!("{}", tr(Message::GenerationCompleted, &[&self.label()]));
        }
        Ok(Calculation { table, exported })
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use geo::{Geometry, polygon};
    use plateau_stats_models::Feature;
    use plateau_stats_store::SpatialContainerStore;

    /// Creates an empty scratch directory unique to `name`.
    pub fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "plateau_stats_metrics_{name}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// A fresh container inside `dir`.
    pub fn store_in(dir: &std::path::Path) -> SpatialContainerStore {
        SpatialContainerStore::create(&dir.join("container.duckdb")).unwrap()
    }

    /// Axis-aligned rectangle polygon.
    pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1)
        ])
    }

    /// A small square building centered on `(x, y)`.
    pub fn building_at(x: f64, y: f64) -> Feature {
        Feature::new(rect(x - 0.01, y - 0.01, x + 0.01, y + 0.01))
    }

    /// A planning polygon with the given `type_id`.
    pub fn planning_area(geometry: Geometry<f64>, type_id: i64) -> Feature {
        Feature::new(geometry).with("type_id", type_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{building_at, planning_area, rect, scratch_dir, store_in};
    use plateau_stats_ingest::{area as areas, building, population};
    use plateau_stats_models::{GeometryKind, Layer, MetricValue};
    use strum::IntoEnumIterator;

    #[test]
    fn file_names_are_distinct_and_numbered() {
        let names: Vec<&str> = Calculator::iter().map(Calculator::file_name).collect();
        assert_eq!(names.len(), 6);
        for (i, name) in names.iter().enumerate() {
            assert!(name.starts_with(&format!("IF10{}_", i + 1)));
            assert!(name.ends_with(".csv"));
        }
    }

    #[test]
    fn run_keeps_table_when_export_fails() {
        let dir = scratch_dir("run_keeps");
        let mut store = store_in(&dir);

        let mut buildings = Layer::new(building::LAYER, GeometryKind::Polygon);
        buildings.push(building_at(0.5, 0.5).with("2020_population", 10.0));
        store.add_layer(&buildings).unwrap();
        let mut induction = Layer::new(areas::INDUCTION_LAYER, GeometryKind::Polygon);
        induction.push(planning_area(rect(0.0, 0.0, 1.0, 1.0), areas::RESIDENTIAL_INDUCTION));
        store.add_layer(&induction).unwrap();
        store
            .add_layer(&Layer::new(population::TARGET_LAYER, GeometryKind::None))
            .unwrap();

        // A regular file where the output folder should be.
        let blocked = dir.join("blocked");
        std::fs::write(&blocked, b"x").unwrap();

        let calc = Calculator::ResidentialInduction.run(&store, &blocked, &[]).unwrap();
        assert_eq!(calc.exported.unwrap_err().kind(), ErrorKind::Export);
        assert_eq!(
            calc.table.row(Year(2020)).and_then(|r| r.get("Area_Pop")),
            Some(MetricValue::Int(10))
        );

        let ok = Calculator::ResidentialInduction
            .run(&store, &dir.join("out"), &[Year(2020)])
            .unwrap();
        assert!(ok.exported.unwrap().is_file());

        drop(store);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
