//! Inputs shared by the calculators: building centroids and area masks.

use geo::{Centroid, Point};
use plateau_stats_ingest::{area, building};
use plateau_stats_messages::{Message, tr};
use plateau_stats_models::{Feature, Layer, MetricRow, MetricValue, Year};
use plateau_stats_spatial::PolygonIndex;
use plateau_stats_spatial::measure::area_ha;
use plateau_stats_store::SpatialContainerStore;

use crate::MetricError;

/// Loads `name`, logging and failing when it is absent.
///
/// # Errors
///
/// * [`MetricError::LayerNotFound`] if the container has no such layer
/// * [`MetricError::Store`] if the layer cannot be read
pub fn require(store: &SpatialContainerStore, name: &str) -> Result<Layer, MetricError> {
    if !store.contains(name)? {
        log::error!("{}", tr(Message::LayerNotFound, &[&name]));
        return Err(MetricError::LayerNotFound {
            layer: name.to_string(),
        });
    }
    Ok(store.load_layer(name)?)
}

/// Loads `name` if present; an absent layer is logged and yields `None`.
///
/// # Errors
///
/// * [`MetricError::Store`] if the layer exists but cannot be read
pub fn optional(store: &SpatialContainerStore, name: &str) -> Result<Option<Layer>, MetricError> {
    if store.contains(name)? {
        Ok(Some(store.load_layer(name)?))
    } else {
        log::warn!("{}", tr(Message::LayerNotFound, &[&name]));
        Ok(None)
    }
}

/// `{year}_population`.
#[must_use]
pub fn population_field(year: Year) -> String {
    format!("{year}_population")
}

/// Truncates a population sum the way whole-person counts are reported.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn whole(value: f64) -> i64 {
    value.trunc() as i64
}

/// [`MetricValue::rate`] over whole counts.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rate(part: i64, total: i64, digits: i32) -> MetricValue {
    MetricValue::rate(part as f64, total as f64, digits)
}

/// People per hectare; unavailable for an empty area.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn density(population: i64, hectares: f64, digits: i32) -> MetricValue {
    if hectares > 0.0 {
        MetricValue::rounded(population as f64 / hectares, digits)
    } else {
        MetricValue::NotAvailable
    }
}

/// Buildings reduced to their centroids.
#[derive(Debug, Clone)]
pub struct Buildings {
    /// The `buildings` layer as stored.
    pub layer: Layer,
    /// Centroid of each feature; `None` for missing or empty geometry.
    pub centroids: Vec<Option<Point<f64>>>,
    /// Census years with a `{Y}_population` field, ascending.
    pub years: Vec<Year>,
}

impl Buildings {
    /// Loads the `buildings` layer.
    ///
    /// # Errors
    ///
    /// See [`require`].
    pub fn load(store: &SpatialContainerStore) -> Result<Self, MetricError> {
        Ok(Self::from_layer(require(store, building::LAYER)?))
    }

    /// Wraps an already loaded layer.
    #[must_use]
    pub fn from_layer(layer: Layer) -> Self {
        let centroids = layer
            .features
            .iter()
            .map(|f| f.geometry.as_ref().and_then(Centroid::centroid))
            .collect();
        let years = layer.years_with_suffix("population").into_iter().collect();
        Self {
            layer,
            centroids,
            years,
        }
    }

    /// Number of buildings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layer.features.len()
    }

    /// Whether there are no buildings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layer.features.is_empty()
    }

    /// Feature at `idx`.
    #[must_use]
    pub fn feature(&self, idx: usize) -> &Feature {
        &self.layer.features[idx]
    }

    /// Which buildings have their centroid inside `region`.
    #[must_use]
    pub fn inside(&self, region: &Region) -> Vec<bool> {
        self.centroids
            .iter()
            .map(|c| c.is_some_and(|p| region.contains(p)))
            .collect()
    }

    /// Sum of `field` over the buildings selected by `mask`; nulls count 0.
    #[must_use]
    pub fn sum(&self, field: &str, mask: &[bool]) -> f64 {
        self.layer
            .features
            .iter()
            .zip(mask)
            .filter(|(_, selected)| **selected)
            .filter_map(|(f, _)| f.f64(field))
            .sum()
    }

    /// Sum of `field` over every building.
    #[must_use]
    pub fn total(&self, field: &str) -> f64 {
        self.layer.features.iter().filter_map(|f| f.f64(field)).sum()
    }

    /// Whole-person population of `year` over `mask`.
    #[must_use]
    pub fn population(&self, year: Year, mask: &[bool]) -> i64 {
        whole(self.sum(&population_field(year), mask))
    }

    /// Whole-person population of `year` over every building.
    #[must_use]
    pub fn total_population(&self, year: Year) -> i64 {
        whole(self.total(&population_field(year)))
    }
}

/// A set of polygons treated as one area.
pub struct Region {
    index: PolygonIndex,
    hectares: f64,
}

impl Region {
    /// Every polygon of `layer`.
    #[must_use]
    pub fn from_layer(layer: &Layer) -> Self {
        Self::from_features(layer.features.iter())
    }

    /// The polygons of `layers` combined.
    #[must_use]
    pub fn union_of(layers: &[&Layer]) -> Self {
        Self::from_features(layers.iter().flat_map(|l| l.features.iter()))
    }

    /// Features of `layer` whose `type_id` equals `type_id`.
    #[must_use]
    pub fn of_type(layer: &Layer, type_id: i64) -> Self {
        Self::from_features(
            layer
                .features
                .iter()
                .filter(|f| f.i64("type_id") == Some(type_id)),
        )
    }

    /// The residential induction area of an `induction_areas` layer.
    #[must_use]
    pub fn residential(induction: &Layer) -> Self {
        Self::of_type(induction, area::RESIDENTIAL_INDUCTION)
    }

    /// The urban function induction area of an `induction_areas` layer.
    #[must_use]
    pub fn urban_function(induction: &Layer) -> Self {
        Self::of_type(induction, area::URBAN_FUNCTION_INDUCTION)
    }

    /// A region with no polygons.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_features(std::iter::empty())
    }

    fn from_features<'a>(features: impl Iterator<Item = &'a Feature>) -> Self {
        let geometries: Vec<_> = features.filter_map(|f| f.geometry.as_ref()).collect();
        let hectares = geometries.iter().map(|g| area_ha(g)).sum();
        Self {
            index: PolygonIndex::from_geometries(geometries.into_iter().enumerate()),
            hectares,
        }
    }

    /// Whether any polygon contains `point`.
    #[must_use]
    pub fn contains(&self, point: Point<f64>) -> bool {
        self.index.any_contains(point)
    }

    /// Summed polygon area in hectares; overlaps count twice.
    #[must_use]
    pub const fn hectares(&self) -> f64 {
        self.hectares
    }

    /// Whether the region has no polygons.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Changes of `columns` between `row` and the row of the previous year.
pub fn changes(
    row: &mut MetricRow,
    previous: Option<&MetricRow>,
    columns: &[(&str, &str)],
) {
    for (source, target) in columns {
        let value = match (row.get(source), previous.and_then(|p| p.get(source))) {
            (Some(cur), Some(prev)) => MetricValue::change(cur, prev),
            _ => MetricValue::NotAvailable,
        };
        row.set(target, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{building_at, planning_area, rect};
    use approx::assert_relative_eq;
    use plateau_stats_models::GeometryKind;

    #[test]
    fn centroid_masks_and_population_sums() {
        let mut layer = Layer::new(building::LAYER, GeometryKind::Polygon);
        layer.push(building_at(0.2, 0.2).with("2020_population", 3.7));
        layer.push(building_at(0.8, 0.8).with("2020_population", 2.6));
        layer.push(Feature::default().with("2015_population", 1.0));
        let buildings = Buildings::from_layer(layer);
        assert_eq!(buildings.years, vec![Year(2015), Year(2020)]);

        let mut induction = Layer::new(area::INDUCTION_LAYER, GeometryKind::Polygon);
        induction.push(planning_area(rect(0.0, 0.0, 0.5, 0.5), area::RESIDENTIAL_INDUCTION));
        induction.push(planning_area(rect(0.5, 0.5, 1.0, 1.0), area::URBAN_FUNCTION_INDUCTION));

        let residential = Region::residential(&induction);
        let mask = buildings.inside(&residential);
        assert_eq!(mask, vec![true, false, false]);
        assert_eq!(buildings.population(Year(2020), &mask), 3);
        assert_eq!(buildings.total_population(Year(2020)), 6);
        assert!(Region::urban_function(&induction).contains(Point::new(0.9, 0.9)));
        assert!(Region::empty().is_empty());
    }

    #[test]
    fn hectares_of_a_small_square() {
        // 0.001 degree square at the equator is about 111 m by 111 m.
        let mut layer = Layer::new("a", GeometryKind::Polygon);
        layer.push(Feature::new(rect(0.0, 0.0, 0.001, 0.001)));
        assert_relative_eq!(Region::from_layer(&layer).hectares(), 1.236, epsilon = 0.01);
    }

    #[test]
    fn changes_need_a_previous_row() {
        let mut prev = MetricRow::new(Year(2015));
        prev.set("Total_Pop", 100_i64);
        let mut row = MetricRow::new(Year(2020));
        row.set("Total_Pop", 110_i64);
        changes(&mut row, Some(&prev), &[("Total_Pop", "Rate_Pop_Change")]);
        assert_eq!(row.get("Rate_Pop_Change"), Some(MetricValue::Number(10.0)));

        changes(&mut prev, None, &[("Total_Pop", "Rate_Pop_Change")]);
        assert_eq!(prev.get("Rate_Pop_Change"), Some(MetricValue::NotAvailable));
    }
}
