//! Merging polygons that share an attribute value.

use std::collections::BTreeMap;

use geo::{Geometry, MultiPolygon};
use plateau_stats_models::{Feature, Layer};

use crate::convert::as_multipolygon;

/// Union of a set of polygonal geometries. Non-polygonal inputs are ignored.
#[must_use]
pub fn union_all<'a>(geometries: impl IntoIterator<Item = &'a Geometry<f64>>) -> MultiPolygon<f64> {
    let parts: Vec<MultiPolygon<f64>> = geometries.into_iter().filter_map(as_multipolygon).collect();
    if parts.is_empty() {
        return MultiPolygon::new(Vec::new());
    }
    geo::unary_union(&parts)
}

/// Replaces the features of `layer` with one feature per distinct value of
/// `group_field`, whose geometry is the union of the group.
///
/// Attributes of the first feature of each group are kept. Groups are
/// emitted in ascending order of their key's text.
pub fn dissolve_layer(layer: &mut Layer, group_field: &str) {
    let mut groups: BTreeMap<String, Vec<Feature>> = BTreeMap::new();
    for feature in std::mem::take(&mut layer.features) {
        groups
            .entry(feature.text(group_field))
            .or_default()
            .push(feature);
    }

    for (key, members) in groups {
        let merged = union_all(members.iter().filter_map(|f| f.geometry.as_ref()));
        let Some(first) = members.into_iter().next() else {
            continue;
        };
        if merged.0.is_empty() {
            log::debug!("Group {key} of {} has no polygon area", layer.name);
            continue;
        }
        let mut feature = Feature::new(Geometry::MultiPolygon(merged));
        feature.attributes = first.attributes;
        if feature.get(group_field).is_null() && !key.is_empty() {
            feature.set(group_field, key);
        }
        layer.features.push(feature);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::area_ha;
    use approx::assert_relative_eq;
    use geo::polygon;
    use plateau_stats_models::GeometryKind;

    #[test]
    fn overlapping_buffers_merge_per_category() {
        let mut layer = Layer::new("bus_stop_buffers", GeometryKind::Polygon);
        let a = polygon![(x: 0.0, y: 0.0), (x: 0.002, y: 0.0), (x: 0.002, y: 0.002), (x: 0.0, y: 0.002)];
        let b = polygon![(x: 0.001, y: 0.0), (x: 0.003, y: 0.0), (x: 0.003, y: 0.002), (x: 0.001, y: 0.002)];
        let c = polygon![(x: 1.0, y: 1.0), (x: 1.001, y: 1.0), (x: 1.001, y: 1.001), (x: 1.0, y: 1.001)];
        layer.push(Feature::new(Geometry::Polygon(a)).with("buffer_distance", 300_i64));
        layer.push(Feature::new(Geometry::Polygon(b)).with("buffer_distance", 300_i64));
        layer.push(Feature::new(Geometry::Polygon(c)).with("buffer_distance", 500_i64));

        dissolve_layer(&mut layer, "buffer_distance");

        assert_eq!(layer.len(), 2);
        let merged = layer.features[0].geometry.as_ref().unwrap();
        let separate = area_ha(&Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0), (x: 0.003, y: 0.0), (x: 0.003, y: 0.002), (x: 0.0, y: 0.002)
        ]));
        assert_relative_eq!(area_ha(merged), separate, max_relative = 1e-6);
        assert_eq!(layer.features[1].i64("buffer_distance"), Some(500));
    }
}
