//! Per-year vacancy flags on buildings.

use std::collections::BTreeSet;

use plateau_stats_messages::{Message, tr};
use plateau_stats_models::{Feature, GeometryKind, Layer, Year};
use plateau_stats_spatial::PointIndex;
use plateau_stats_spatial::convert::as_multipolygon;

use crate::AssignError;

/// Value of the `vacancy` attribute on buildings flagged in any year.
pub const VACANT: &str = "空き家";

/// Flag field for population year `year`.
#[must_use]
pub fn flag_field(year: Year) -> String {
    format!("{year}_is_vacancy")
}

/// The earliest vacancy survey year at or after `year`.
#[must_use]
pub fn target_year(survey_years: &BTreeSet<Year>, year: Year) -> Option<Year> {
    survey_years.range(year..).next().copied()
}

/// Sets `{Y}_is_vacancy` for every population year `Y` of `buildings`.
///
/// The flag is 1 when the footprint contains a vacancy point of the
/// earliest survey at or after `Y`, else 0. Years with no such survey are
/// reported and returned. Buildings flagged in any year get
/// `vacancy` = [`VACANT`].
///
/// # Errors
///
/// * [`AssignError::FieldNotFound`] if `vacancies` has no `year` field
pub fn assign_vacancy(buildings: &mut Layer, vacancies: &Layer) -> Result<Vec<Year>, AssignError> {
    if !vacancies.has_field("year") {
        return Err(AssignError::FieldNotFound {
            field: "year".to_string(),
        });
    }
    let survey_years = vacancies.year_values("year");
    let years = buildings.years_with_suffix("population");
    buildings.ensure_field("vacancy");

    let mut missing = Vec::new();
    for year in years {
        let field = flag_field(year);
        buildings.ensure_field(&field);
        let Some(target) = target_year(&survey_years, year) else {
            log::warn!("{}", tr(Message::NoVacancyPoints, &[&year]));
            missing.push(year);
            continue;
        };

        let mut points = Layer::new(&vacancies.name, GeometryKind::Point);
        points.features = vacancies
            .features
            .iter()
            .filter(|f| f.i64("year") == Some(target.as_i64()))
            .cloned()
            .collect();
        let index = PointIndex::from_layer(&points);
        log::debug!("{year}: matching {} vacancy points of {target}", index.len());

        for building in &mut buildings.features {
            let vacant = building
                .geometry
                .as_ref()
                .and_then(as_multipolygon)
                .is_some_and(|footprint| !index.within(&footprint).is_empty());
            building.set(&field, i64::from(vacant));
            if vacant {
                building.set("vacancy", VACANT);
            }
        }
    }
    Ok(missing)
}

/// Whether `building` was flagged vacant in any year.
#[must_use]
pub fn is_vacant(building: &Feature) -> bool {
    building.text("vacancy") == VACANT
}
