//! GeoJSON text conversion and geometry coercions.

use geo::{BoundingRect, Geometry, MultiPolygon, Point};
use geojson::GeoJson;
use rstar::AABB;

/// Serializes a geometry as a GeoJSON geometry object.
#[must_use]
pub fn to_geojson(geometry: &Geometry<f64>) -> String {
    geojson::Geometry::new(geojson::Value::from(geometry)).to_string()
}

/// Parses a GeoJSON geometry object. Features and collections are rejected.
#[must_use]
pub fn from_geojson(text: &str) -> Option<Geometry<f64>> {
    let geojson: GeoJson = text.parse().ok()?;
    if let GeoJson::Geometry(geom) = geojson {
        geom.try_into().ok()
    } else {
        None
    }
}

/// Polygonal view of a geometry; `None` for points and lines.
#[must_use]
pub fn as_multipolygon(geometry: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::MultiPolygon(mp) => Some(mp.clone()),
        Geometry::Polygon(p) => Some(MultiPolygon(vec![p.clone()])),
        Geometry::Rect(r) => Some(MultiPolygon(vec![r.to_polygon()])),
        Geometry::Triangle(t) => Some(MultiPolygon(vec![t.to_polygon()])),
        _ => None,
    }
}

/// Single point view; multi-points with exactly one member qualify.
#[must_use]
pub fn as_point(geometry: &Geometry<f64>) -> Option<Point<f64>> {
    match geometry {
        Geometry::Point(p) => Some(*p),
        Geometry::MultiPoint(mp) if mp.0.len() == 1 => Some(mp.0[0]),
        _ => None,
    }
}

/// Bounding box envelope for the R-tree; a degenerate box at the origin
/// for empty geometries.
#[must_use]
pub fn envelope<T: BoundingRect<f64>>(geometry: &T) -> AABB<[f64; 2]>
where
    T::Output: Into<Option<geo::Rect<f64>>>,
{
    geometry.bounding_rect().into().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn polygons_survive_geojson_text() {
        let poly = polygon![(x: 139.0, y: 35.0), (x: 139.1, y: 35.0), (x: 139.1, y: 35.1)];
        let text = to_geojson(&Geometry::Polygon(poly.clone()));
        assert!(text.contains("\"Polygon\""));
        assert_eq!(from_geojson(&text), Some(Geometry::Polygon(poly)));
    }

    #[test]
    fn feature_objects_are_not_geometries() {
        let text = r#"{"type":"Feature","geometry":null,"properties":{}}"#;
        assert_eq!(from_geojson(text), None);
    }

    #[test]
    fn points_are_not_polygonal() {
        assert!(as_multipolygon(&Geometry::Point(Point::new(1.0, 2.0))).is_none());
        assert_eq!(
            as_point(&Geometry::Point(Point::new(1.0, 2.0))),
            Some(Point::new(1.0, 2.0))
        );
    }
}
