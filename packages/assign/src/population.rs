//! Mesh population apportioned to residential buildings.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use geo::Centroid;
use plateau_stats_models::{Feature, Layer};
use plateau_stats_spatial::PolygonIndex;
use regex::Regex;

use crate::AssignError;

/// Usages that house residents.
pub const RESIDENTIAL_USAGES: [&str; 5] = [
    "住宅",
    "共同住宅",
    "店舗等併用住宅",
    "店舗等併用共同住宅",
    "作業所併用住宅",
];

/// Buildings smaller than this floor area (m²) are ignored.
pub const MIN_FLOOR_AREA: f64 = 10.0;

static POPULATION_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(20\d{2}_(population|male|female|age_.*)|future_20\d{2}_PT\w+)$")
        .unwrap_or_else(|e| unreachable!("bad pattern: {e}"))
});

/// Mesh fields that are apportioned, in mesh schema order.
#[must_use]
pub fn population_fields(meshes: &Layer) -> Vec<String> {
    meshes
        .fields
        .iter()
        .filter(|f| POPULATION_FIELD.is_match(f))
        .cloned()
        .collect()
}

/// Floor area used for living.
///
/// Single-storey buildings count half their floor area. Taller ones drop
/// one storey for non-residential use plus every basement storey, and never
/// go below zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn living_area(building: &Feature) -> f64 {
    let floor_area = building.f64("total_floor_area").unwrap_or(0.0);
    let above = building
        .i64("storeys_above_ground")
        .filter(|v| *v != 0)
        .unwrap_or(1);
    let below = building.i64("storeys_below_ground").unwrap_or(0);

    let ratio = if above + below == 1 {
        0.5
    } else {
        ((above - below - 1) as f64 / above as f64).max(0.0)
    };
    floor_area * ratio
}

fn is_residential(building: &Feature) -> bool {
    let usage = building.text("usage");
    RESIDENTIAL_USAGES.contains(&usage.as_str())
}

fn require(layer: &Layer, field: &str) -> Result<(), AssignError> {
    if layer.has_field(field) {
        Ok(())
    } else {
        Err(AssignError::FieldNotFound {
            field: field.to_string(),
        })
    }
}

/// Spreads each mesh's population fields over the residential buildings
/// whose centroid it contains, proportionally to [`living_area`].
///
/// Every population field is declared on `buildings`; buildings outside
/// any populated mesh keep nulls. Returns the number of buildings that
/// received a share.
///
/// # Errors
///
/// * [`AssignError::FieldNotFound`] if `buildings` has no `usage` or
///   `total_floor_area` field
pub fn assign_population(buildings: &mut Layer, meshes: &Layer) -> Result<usize, AssignError> {
    let fields = population_fields(meshes);
    for field in &fields {
        buildings.ensure_field(field);
    }
    if buildings.is_empty() {
        return Ok(0);
    }
    require(buildings, "usage")?;
    require(buildings, "total_floor_area")?;

    let index = PolygonIndex::from_layer(meshes);
    let mut members: BTreeMap<usize, Vec<(usize, f64)>> = BTreeMap::new();
    for (b, building) in buildings.features.iter().enumerate() {
        if building.f64("total_floor_area").unwrap_or(0.0) < MIN_FLOOR_AREA
            || !is_residential(building)
        {
            continue;
        }
        let Some(centroid) = building.geometry.as_ref().and_then(Centroid::centroid) else {
            continue;
        };
        let area = living_area(building);
        for mesh in index.containing(centroid) {
            members.entry(mesh).or_default().push((b, area));
        }
    }

    let mut populated = 0;
    for (mesh, residents) in members {
        let total: f64 = residents.iter().map(|(_, area)| area).sum();
        if total <= 0.0 {
            continue;
        }
        populated += residents.len();
        let source = &meshes.features[mesh];
        for (b, area) in residents {
            let building = &mut buildings.features[b];
            for field in &fields {
                let value = source.f64(field).unwrap_or(0.0);
                let current = building.f64(field).unwrap_or(0.0);
                building.set(field, current + value * area / total);
            }
        }
    }
    Ok(populated)
}
