//! Geometry validation and repair.
//!
//! A polygon is valid when every ring is closed, has at least four finite
//! coordinates, encloses a non-zero area and no two of its edges cross or
//! overlap. Rings of the same polygon may touch each other at single points.
//! Invalid polygons are rebuilt by unioning them with themselves, which
//! splits bow-ties and drops zero-area spikes.

use geo::line_intersection::{LineIntersection, line_intersection};
use geo::{
    Area, Coord, Geometry, Line, LineString, MultiLineString, MultiPoint, MultiPolygon, Point,
    Polygon,
};
use plateau_stats_models::Layer;
use rstar::{AABB, RTree, RTreeObject};

use crate::{SpatialError, geometry_type_name};

/// One polygon edge stored in the R-tree.
struct EdgeEntry {
    ring: usize,
    index: usize,
    ring_len: usize,
    line: Line<f64>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for EdgeEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl EdgeEntry {
    fn new(ring: usize, index: usize, ring_len: usize, line: Line<f64>) -> Self {
        let envelope = AABB::from_corners(
            [line.start.x.min(line.end.x), line.start.y.min(line.end.y)],
            [line.start.x.max(line.end.x), line.start.y.max(line.end.y)],
        );
        Self {
            ring,
            index,
            ring_len,
            line,
            envelope,
        }
    }

    const fn is_adjacent(&self, other: &Self) -> bool {
        if self.ring != other.ring {
            return false;
        }
        let (a, b) = if self.index < other.index {
            (self.index, other.index)
        } else {
            (other.index, self.index)
        };
        b - a == 1 || (a == 0 && b + 1 == self.ring_len)
    }
}

/// Whether a geometry is usable as-is.
#[must_use]
pub fn is_valid(geometry: &Geometry<f64>) -> bool {
    match geometry {
        Geometry::Point(p) => finite(p.0),
        Geometry::MultiPoint(mp) => !mp.0.is_empty() && mp.iter().all(|p| finite(p.0)),
        Geometry::Line(l) => finite(l.start) && finite(l.end) && l.start != l.end,
        Geometry::LineString(ls) => line_is_valid(ls),
        Geometry::MultiLineString(mls) => !mls.0.is_empty() && mls.iter().all(line_is_valid),
        Geometry::Polygon(p) => polygon_is_valid(p),
        Geometry::MultiPolygon(mp) => !mp.0.is_empty() && mp.iter().all(polygon_is_valid),
        Geometry::Rect(_) | Geometry::Triangle(_) => true,
        Geometry::GeometryCollection(gc) => gc.iter().all(is_valid),
    }
}

fn finite(c: Coord<f64>) -> bool {
    c.x.is_finite() && c.y.is_finite()
}

fn line_is_valid(ls: &LineString<f64>) -> bool {
    ls.0.len() >= 2 && ls.0.iter().all(|c| finite(*c)) && ls.0.windows(2).any(|w| w[0] != w[1])
}

fn ring_is_well_formed(ring: &LineString<f64>) -> bool {
    ring.0.len() >= 4
        && ring.is_closed()
        && ring.0.iter().all(|c| finite(*c))
        && ring.0.windows(2).all(|w| w[0] != w[1])
        && Polygon::new(ring.clone(), Vec::new()).unsigned_area() > 0.0
}

fn polygon_is_valid(polygon: &Polygon<f64>) -> bool {
    if !ring_is_well_formed(polygon.exterior()) || !polygon.interiors().iter().all(ring_is_well_formed)
    {
        return false;
    }
    !has_bad_intersection(polygon)
}

fn has_bad_intersection(polygon: &Polygon<f64>) -> bool {
    let entries: Vec<EdgeEntry> = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .enumerate()
        .flat_map(|(ring, ls)| {
            let ring_len = ls.0.len().saturating_sub(1);
            ls.lines()
                .enumerate()
                .map(move |(index, line)| EdgeEntry::new(ring, index, ring_len, line))
        })
        .collect();
    let tree = RTree::bulk_load(entries);

    for edge in tree.iter() {
        for other in tree.locate_in_envelope_intersecting(&edge.envelope) {
            if (other.ring, other.index) <= (edge.ring, edge.index) {
                continue;
            }
            match line_intersection(edge.line, other.line) {
                None => {}
                Some(LineIntersection::SinglePoint { is_proper, .. }) => {
                    if is_proper || (edge.ring == other.ring && !edge.is_adjacent(other)) {
                        return true;
                    }
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    if intersection.start != intersection.end
                        || (edge.ring == other.ring && !edge.is_adjacent(other))
                    {
                        return true;
                    }
                }
            }
        }
    }
    false
}

/// Returns a valid version of `geometry`.
///
/// Non-finite and consecutive duplicate coordinates are dropped, rings are
/// closed, and self-intersecting polygons are rebuilt. Multi-part inputs
/// keep their surviving parts.
///
/// # Errors
///
/// * [`SpatialError::Degenerate`] when nothing usable remains
/// * [`SpatialError::Unsupported`] for geometry collections
pub fn repair(geometry: Geometry<f64>) -> Result<Geometry<f64>, SpatialError> {
    if is_valid(&geometry) {
        return Ok(geometry);
    }

    match geometry {
        Geometry::Point(p) => {
            if finite(p.0) {
                Ok(Geometry::Point(p))
            } else {
                Err(SpatialError::degenerate("non-finite point"))
            }
        }
        Geometry::MultiPoint(mp) => {
            let points: Vec<Point<f64>> = mp.into_iter().filter(|p| finite(p.0)).collect();
            if points.is_empty() {
                Err(SpatialError::degenerate("no finite points"))
            } else {
                Ok(Geometry::MultiPoint(MultiPoint::new(points)))
            }
        }
        Geometry::Line(l) => repair(Geometry::LineString(LineString::new(vec![l.start, l.end]))),
        Geometry::LineString(ls) => repair_line(&ls).map(Geometry::LineString),
        Geometry::MultiLineString(mls) => {
            let lines: Vec<LineString<f64>> =
                mls.iter().filter_map(|ls| repair_line(ls).ok()).collect();
            if lines.is_empty() {
                Err(SpatialError::degenerate("every line collapsed"))
            } else {
                Ok(Geometry::MultiLineString(MultiLineString::new(lines)))
            }
        }
        Geometry::Polygon(p) => repair_polygon(&p).map(simplify_multi),
        Geometry::MultiPolygon(mp) => {
            let parts: Vec<Polygon<f64>> = mp
                .iter()
                .filter_map(|p| repair_polygon(p).ok())
                .flat_map(|mp| mp.0)
                .collect();
            if parts.is_empty() {
                Err(SpatialError::degenerate("every polygon collapsed"))
            } else {
                Ok(Geometry::MultiPolygon(MultiPolygon::new(parts)))
            }
        }
        Geometry::Rect(r) => Ok(Geometry::Rect(r)),
        Geometry::Triangle(t) => Ok(Geometry::Triangle(t)),
        other @ Geometry::GeometryCollection(_) => Err(SpatialError::Unsupported {
            found: geometry_type_name(&other).to_string(),
        }),
    }
}

fn simplify_multi(mut mp: MultiPolygon<f64>) -> Geometry<f64> {
    if mp.0.len() == 1 {
        if let Some(p) = mp.0.pop() {
            return Geometry::Polygon(p);
        }
    }
    Geometry::MultiPolygon(mp)
}

fn clean_coords(coords: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let mut out: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for c in coords.iter().copied().filter(|c| finite(*c)) {
        if out.last() != Some(&c) {
            out.push(c);
        }
    }
    out
}

fn repair_line(ls: &LineString<f64>) -> Result<LineString<f64>, SpatialError> {
    let coords = clean_coords(&ls.0);
    if coords.len() < 2 {
        return Err(SpatialError::degenerate("line has fewer than 2 distinct points"));
    }
    Ok(LineString::new(coords))
}

fn clean_ring(ring: &LineString<f64>) -> Option<LineString<f64>> {
    let mut coords = clean_coords(&ring.0);
    if let (Some(first), Some(last)) = (coords.first().copied(), coords.last().copied()) {
        if first != last {
            coords.push(first);
        }
    }
    (coords.len() >= 4).then(|| LineString::new(coords))
}

fn repair_polygon(polygon: &Polygon<f64>) -> Result<MultiPolygon<f64>, SpatialError> {
    let shell = clean_ring(polygon.exterior())
        .ok_or_else(|| SpatialError::degenerate("shell has fewer than 4 coordinates"))?;
    let holes: Vec<LineString<f64>> = polygon.interiors().iter().filter_map(clean_ring).collect();
    let cleaned = Polygon::new(shell, holes);

    if polygon_is_valid(&cleaned) {
        return Ok(MultiPolygon::new(vec![cleaned]));
    }

    let rebuilt = geo::unary_union(std::iter::once(&cleaned));
    let parts: Vec<Polygon<f64>> = rebuilt
        .into_iter()
        .filter(|p| p.unsigned_area() > 0.0)
        .collect();
    if parts.is_empty() {
        return Err(SpatialError::degenerate("polygon has no area"));
    }
    Ok(MultiPolygon::new(parts))
}

/// Outcome of [`repair_layer`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Features whose geometry was rewritten.
    pub fixed: usize,
    /// `(feature index, reason)` of features that were removed.
    pub dropped: Vec<(usize, String)>,
}

/// Repairs every geometry of `layer` in place, dropping features whose
/// geometry cannot be made valid. Indices in the report refer to the
/// layer's order before the call.
pub fn repair_layer(layer: &mut Layer) -> RepairReport {
    let mut report = RepairReport::default();
    let features = std::mem::take(&mut layer.features);

    for (index, mut feature) in features.into_iter().enumerate() {
        let Some(geometry) = feature.geometry.take() else {
            layer.features.push(feature);
            continue;
        };
        if is_valid(&geometry) {
            feature.geometry = Some(geometry);
            layer.features.push(feature);
            continue;
        }
        match repair(geometry) {
            Ok(fixed) => {
                report.fixed += 1;
                feature.geometry = Some(fixed);
                layer.features.push(feature);
            }
            Err(e) => {
                log::debug!("Dropping feature {index} of {}: {e}", layer.name);
                report.dropped.push((index, e.to_string()));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use plateau_stats_models::{Feature, GeometryKind};

    fn square() -> Polygon<f64> {
        polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)]
    }

    #[test]
    fn simple_square_is_valid() {
        assert!(is_valid(&Geometry::Polygon(square())));
    }

    #[test]
    fn bow_tie_is_invalid_and_repairable() {
        let bow_tie = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 1.0), (1.0, 0.0), (0.0, 1.0), (0.0, 0.0)]),
            Vec::new(),
        );
        let geometry = Geometry::Polygon(bow_tie);
        assert!(!is_valid(&geometry));

        let fixed = repair(geometry).unwrap();
        assert!(is_valid(&fixed));
        assert!(fixed.unsigned_area() > 0.0);
    }

    #[test]
    fn unclosed_ring_with_duplicates_is_cleaned() {
        let ring = LineString::from(vec![
            (0.0, 0.0),
            (1.0, 0.0),
            (1.0, 0.0),
            (1.0, 1.0),
            (0.0, 1.0),
        ]);
        let fixed = repair(Geometry::Polygon(Polygon::new(ring, Vec::new()))).unwrap();
        let Geometry::Polygon(p) = fixed else {
            panic!("expected polygon");
        };
        assert_eq!(p.exterior().0.len(), 5);
        assert!(p.exterior().is_closed());
    }

    #[test]
    fn collapsed_polygon_is_degenerate() {
        let flat = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (0.0, 0.0)]),
            Vec::new(),
        );
        assert!(matches!(
            repair(Geometry::Polygon(flat)),
            Err(SpatialError::Degenerate { .. })
        ));
    }

    #[test]
    fn layer_repair_drops_only_bad_features() {
        let mut layer = Layer::new("zones", GeometryKind::Polygon);
        layer.push(Feature::new(Geometry::Polygon(square())).with("key_code", "1"));
        layer.push(
            Feature::new(Geometry::Polygon(Polygon::new(
                LineString::from(vec![(0.0, 0.0), (1.0, 0.0)]),
                Vec::new(),
            )))
            .with("key_code", "2"),
        );
        layer.push(Feature::new(None).with("key_code", "3"));

        let report = repair_layer(&mut layer);
        assert_eq!(report.fixed, 0);
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].0, 1);
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.features[1].text("key_code"), "3");
    }
}
