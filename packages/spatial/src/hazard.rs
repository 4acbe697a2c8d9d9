//! Per-cell hazard composite.

use geo::Geometry;
use plateau_stats_models::hazard::{SCALE_FIELD, WORST_COLUMN};
use plateau_stats_models::{HazardKind, Layer, ScaleClass};
use strum::IntoEnumIterator;

use crate::PolygonIndex;

/// Hazard polygons of one kind, with the scale class of each feature.
pub struct HazardSet {
    kind: HazardKind,
    index: PolygonIndex,
    classes: Vec<ScaleClass>,
}

impl HazardSet {
    /// Indexes every polygon of `layers` under `kind`.
    ///
    /// A feature's class comes from its scale attribute and defaults to
    /// [`ScaleClass::Maximum`].
    #[must_use]
    pub fn new(kind: HazardKind, layers: &[&Layer]) -> Self {
        let mut classes = Vec::new();
        let mut geometries: Vec<(usize, &Geometry<f64>)> = Vec::new();
        for layer in layers {
            for feature in &layer.features {
                let Some(geometry) = feature.geometry.as_ref() else {
                    continue;
                };
                let class = feature
                    .i64(SCALE_FIELD)
                    .and_then(ScaleClass::from_code)
                    .unwrap_or(ScaleClass::Maximum);
                geometries.push((classes.len(), geometry));
                classes.push(class);
            }
        }
        Self {
            kind,
            index: PolygonIndex::from_geometries(geometries),
            classes,
        }
    }

    /// Maximum class among polygons intersecting `cell`.
    #[must_use]
    pub fn max_class(&self, cell: &Geometry<f64>) -> Option<ScaleClass> {
        self.index
            .intersecting(cell)
            .into_iter()
            .filter_map(|id| self.classes.get(id).copied())
            .max()
    }
}

/// Writes one column per hazard kind plus the worst-case column onto each
/// cell of `cells`. Values are class codes; 0 means no hazard.
///
/// Kinds without a set in `sets` are written as 0.
pub fn composite_hazards(cells: &mut Layer, sets: &[HazardSet]) {
    for kind in HazardKind::iter() {
        cells.ensure_field(kind.composite_column());
    }
    cells.ensure_field(WORST_COLUMN);

    for cell in &mut cells.features {
        let mut worst = 0;
        for kind in HazardKind::iter() {
            let code = cell
                .geometry
                .as_ref()
                .and_then(|g| {
                    sets.iter()
                        .filter(|s| s.kind == kind)
                        .filter_map(|s| s.max_class(g))
                        .max()
                })
                .map_or(0, ScaleClass::code);
            worst = worst.max(code);
            cell.set(kind.composite_column(), code);
        }
        cell.set(WORST_COLUMN, worst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use plateau_stats_models::{Feature, GeometryKind};

    fn rect(x0: f64, x1: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![(x: x0, y: 0.0), (x: x1, y: 0.0), (x: x1, y: 1.0), (x: x0, y: 1.0)])
    }

    #[test]
    fn composite_takes_the_maximum_class() {
        let mut cells = Layer::new("meshes", GeometryKind::Polygon);
        cells.push(Feature::new(rect(0.0, 1.0)));
        cells.push(Feature::new(rect(1.0, 2.0)));
        cells.push(Feature::new(rect(5.0, 6.0)));

        let mut planned = Layer::new("hazard_area_planned_scales", GeometryKind::Polygon);
        planned.push(Feature::new(rect(0.2, 1.5)).with(SCALE_FIELD, 1_i64));
        let mut maximum = Layer::new("hazard_area_maximum_scales", GeometryKind::Polygon);
        maximum.push(Feature::new(rect(0.1, 0.3)).with(SCALE_FIELD, 2_i64));

        let mut tsunami = Layer::new("hazard_area_tsunamis", GeometryKind::Polygon);
        tsunami.push(Feature::new(rect(1.4, 1.6)).with(SCALE_FIELD, 1_i64));

        let sets = vec![
            HazardSet::new(HazardKind::RiverFlood, &[&planned, &maximum]),
            HazardSet::new(HazardKind::Tsunami, &[&tsunami]),
        ];
        composite_hazards(&mut cells, &sets);

        let river = HazardKind::RiverFlood.composite_column();
        let tsunami_col = HazardKind::Tsunami.composite_column();
        assert_eq!(cells.features[0].i64(river), Some(2));
        assert_eq!(cells.features[1].i64(river), Some(1));
        assert_eq!(cells.features[1].i64(tsunami_col), Some(1));
        assert_eq!(cells.features[2].i64(river), Some(0));
        assert_eq!(cells.features[2].i64(WORST_COLUMN), Some(0));
        assert_eq!(cells.features[0].i64(WORST_COLUMN), Some(2));
        assert_eq!(
            cells.features[0].i64(HazardKind::Landslide.composite_column()),
            Some(0)
        );
    }
}
