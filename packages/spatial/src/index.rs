//! R-tree indexes over layer features.
//!
//! Entries remember the position of the feature they came from, so callers
//! index into their own [`Layer`] with the ids returned by lookups.

use geo::{Contains, Geometry, Intersects, MultiPolygon, Point};
use plateau_stats_models::Layer;
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree, RTreeObject};

use crate::convert::{as_multipolygon, as_point, envelope};

/// A polygon feature stored in the R-tree.
struct PolygonEntry {
    id: usize,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for PolygonEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Point-in-polygon and overlap lookups over a polygon layer.
pub struct PolygonIndex {
    tree: RTree<PolygonEntry>,
}

impl PolygonIndex {
    /// Indexes the polygonal features of `layer`; other geometries are
    /// skipped.
    #[must_use]
    pub fn from_layer(layer: &Layer) -> Self {
        Self::from_geometries(
            layer
                .features
                .iter()
                .enumerate()
                .filter_map(|(id, f)| f.geometry.as_ref().map(|g| (id, g))),
        )
    }

    /// Indexes arbitrary `(id, geometry)` pairs.
    #[must_use]
    pub fn from_geometries<'a>(
        geometries: impl IntoIterator<Item = (usize, &'a Geometry<f64>)>,
    ) -> Self {
        let entries: Vec<PolygonEntry> = geometries
            .into_iter()
            .filter_map(|(id, geometry)| {
                let polygon = as_multipolygon(geometry)?;
                Some(PolygonEntry {
                    id,
                    envelope: envelope(&polygon),
                    polygon,
                })
            })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed polygons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether nothing was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Ids of every polygon containing `point`, ascending.
    #[must_use]
    pub fn containing(&self, point: Point<f64>) -> Vec<usize> {
        let query_env = AABB::from_point([point.x(), point.y()]);
        let mut ids: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.contains(&point))
            .map(|entry| entry.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Lowest id of a polygon containing `point`.
    ///
    /// Meshes and zones tile without overlap, so the first match is the
    /// only one.
    #[must_use]
    pub fn first_containing(&self, point: Point<f64>) -> Option<usize> {
        self.containing(point).into_iter().next()
    }

    /// Whether any polygon contains `point`.
    #[must_use]
    pub fn any_contains(&self, point: Point<f64>) -> bool {
        let query_env = AABB::from_point([point.x(), point.y()]);
        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .any(|entry| entry.polygon.contains(&point))
    }

    /// Ids of every polygon intersecting `geometry`, ascending.
    #[must_use]
    pub fn intersecting(&self, geometry: &Geometry<f64>) -> Vec<usize> {
        let query_env = envelope(geometry);
        let mut ids: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.intersects(geometry))
            .map(|entry| entry.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Whether any polygon intersects `geometry`.
    #[must_use]
    pub fn any_intersects(&self, geometry: &Geometry<f64>) -> bool {
        let query_env = envelope(geometry);
        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .any(|entry| entry.polygon.intersects(geometry))
    }
}

/// Envelope lookups over a point layer.
pub struct PointIndex {
    tree: RTree<GeomWithData<[f64; 2], usize>>,
}

impl PointIndex {
    /// Indexes the point features of `layer`.
    #[must_use]
    pub fn from_layer(layer: &Layer) -> Self {
        let entries = layer
            .features
            .iter()
            .enumerate()
            .filter_map(|(id, f)| {
                let p = f.geometry.as_ref().and_then(as_point)?;
                Some(GeomWithData::new([p.x(), p.y()], id))
            })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether nothing was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Ids of the points inside `polygon`, ascending.
    #[must_use]
    pub fn within(&self, polygon: &MultiPolygon<f64>) -> Vec<usize> {
        let query_env = envelope(polygon);
        let mut ids: Vec<usize> = self
            .tree
            .locate_in_envelope(&query_env)
            .filter(|entry| {
                let [x, y] = *entry.geom();
                polygon.contains(&Point::new(x, y))
            })
            .map(|entry| entry.data)
            .collect();
        ids.sort_unstable();
        ids
    }
}
