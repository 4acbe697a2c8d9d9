#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Joins building footprints with mesh population and vacancy points.
//!
//! [`assign_population`] spreads every mesh's population columns over the
//! residential buildings whose centroid lies in the mesh, weighted by living
//! floor area. [`assign_vacancy`] flags buildings containing a vacancy point
//! of the matching survey year. [`run`] applies both to the container's
//! `buildings` layer and writes it back.

pub mod population;
pub mod vacancy;

use plateau_stats_ingest::{building, population as meshes, vacancy as vacancies};
use plateau_stats_messages::{Message, tr};
use plateau_stats_models::{ErrorKind, Year};
use plateau_stats_store::{SpatialContainerStore, StoreError};

pub use population::assign_population;
pub use vacancy::assign_vacancy;

/// Errors raised while assigning data to buildings.
#[derive(Debug, thiserror::Error)]
pub enum AssignError {
    /// An input layer lacks a field the assignment depends on.
    #[error("The field {field} does not exist.")]
    FieldNotFound {
        /// The missing field.
        field: String,
    },

    /// Reading or writing the container failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AssignError {
    /// Classifies this error in the shared taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::FieldNotFound { .. } => ErrorKind::MissingInput,
            Self::Store(e) => e.kind(),
        }
    }
}

/// Outcome of [`run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignReport {
    /// Buildings that received a population share.
    pub populated_buildings: usize,
    /// Population years without vacancy points at or after them.
    pub years_without_vacancies: Vec<Year>,
    /// Whether the vacancy layer was missing, leaving flags unset.
    pub vacancies_missing: bool,
}

/// Assigns population and vacancy flags to `buildings` and stores it.
///
/// A missing `vacancies` layer skips the flags but still writes the
/// population shares.
///
/// # Errors
///
/// * [`AssignError::Store`] if `buildings` or `meshes` cannot be loaded or
///   the result cannot be written
/// * [`AssignError::FieldNotFound`] if a required attribute is absent
pub fn run(store: &mut SpatialContainerStore) -> Result<AssignReport, AssignError> {
    let mut buildings = store.load_layer(building::LAYER)?;
    let mesh_layer = store.load_layer(meshes::LAYER)?;
    let mut report = AssignReport {
        populated_buildings: assign_population(&mut buildings, &mesh_layer)?,
        ..AssignReport::default()
    };
    log::info!("{}", tr(Message::PopulationAssigned, &[]));

    if store.contains(vacancies::LAYER)? {
        let points = store.load_layer(vacancies::LAYER)?;
        report.years_without_vacancies = assign_vacancy(&mut buildings, &points)?;
        log::info!("{}", tr(Message::VacancyAssigned, &[]));
    } else {
        log::warn!("{}", tr(Message::LayerNotFound, &[&vacancies::LAYER]));
        report.vacancies_missing = true;
    }

    store.add_layer(&buildings)?;
    Ok(report)
}
