//! Walking reach over a road network.
//!
//! Roads are split into segments whose endpoints become graph nodes; two
//! segments are connected only where they share an identical coordinate.
//! Reach starts at the nodes nearest to an origin and spreads along the
//! network up to a distance limit. Every edge relaxed on the way is
//! buffered by a radius that shrinks linearly with the distance already
//! walked, and the buffers are unioned into one reach polygon.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

use geo::{Coord, Geometry, LineString, MultiPolygon, Point};
use plateau_stats_models::Layer;
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree};

use crate::buffer::{DEFAULT_QUADRANT_SEGMENTS, buffer_line, circle};
use crate::measure::{LocalProjection, haversine_m};

/// Radius in meters of the buffer around an edge reached at distance 0.
pub const EDGE_BUFFER_M: f64 = 200.0;

/// Undirected road graph in lon/lat.
#[derive(Debug, Default)]
pub struct RoadGraph {
    nodes: Vec<Coord<f64>>,
    edges: Vec<Edge>,
    adjacency: Vec<Vec<usize>>,
    node_tree: RTree<GeomWithData<[f64; 2], usize>>,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    a: usize,
    b: usize,
    length_m: f64,
}

impl Edge {
    const fn other(&self, node: usize) -> usize {
        if self.a == node { self.b } else { self.a }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct State {
    distance: f64,
    node: usize,
}

impl Eq for State {}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the closest node first.
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl RoadGraph {
    /// Builds a graph from line strings.
    #[must_use]
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a LineString<f64>>) -> Self {
        let mut graph = Self::default();
        let mut ids: BTreeMap<(u64, u64), usize> = BTreeMap::new();

        for line in lines {
            for segment in line.lines() {
                if segment.start == segment.end {
                    continue;
                }
                let a = graph.node_id(&mut ids, segment.start);
                let b = graph.node_id(&mut ids, segment.end);
                let edge = graph.edges.len();
                graph.edges.push(Edge {
                    a,
                    b,
                    length_m: haversine_m(segment.start.into(), segment.end.into()),
                });
                graph.adjacency[a].push(edge);
                graph.adjacency[b].push(edge);
            }
        }

        let entries = graph
            .nodes
            .iter()
            .enumerate()
            .map(|(id, c)| GeomWithData::new([c.x, c.y], id))
            .collect();
        graph.node_tree = RTree::bulk_load(entries);
        graph
    }

    /// Builds a graph from the line features of `layer`.
    #[must_use]
    pub fn from_layer(layer: &Layer) -> Self {
        let mut lines: Vec<&LineString<f64>> = Vec::new();
        for feature in &layer.features {
            match feature.geometry.as_ref() {
                Some(Geometry::LineString(ls)) => lines.push(ls),
                Some(Geometry::MultiLineString(mls)) => lines.extend(mls.iter()),
                _ => {}
            }
        }
        Self::from_lines(lines)
    }

    fn node_id(&mut self, ids: &mut BTreeMap<(u64, u64), usize>, c: Coord<f64>) -> usize {
        *ids.entry((c.x.to_bits(), c.y.to_bits())).or_insert_with(|| {
            self.nodes.push(c);
            self.adjacency.push(Vec::new());
            self.nodes.len() - 1
        })
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no edges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// The `k` nodes closest to `point`, nearest first.
    #[must_use]
    pub fn nearest_nodes(&self, point: Point<f64>, k: usize) -> Vec<usize> {
        self.node_tree
            .nearest_neighbor_iter(&[point.x(), point.y()])
            .take(k)
            .map(|entry| entry.data)
            .collect()
    }

    /// Shortest network distance in meters from any of `sources` to every
    /// node within `max_m`.
    #[must_use]
    pub fn distances_from(&self, sources: &[usize], max_m: f64) -> BTreeMap<usize, f64> {
        self.search(sources, max_m, |_, _| {})
    }

    /// Dijkstra search that reports each relaxed edge with the distance at
    /// its far end.
    fn search(
        &self,
        sources: &[usize],
        max_m: f64,
        mut on_edge: impl FnMut(&Edge, f64),
    ) -> BTreeMap<usize, f64> {
        let mut settled: BTreeMap<usize, f64> = BTreeMap::new();
        let mut heap: BinaryHeap<State> = sources
            .iter()
            .map(|&node| State {
                distance: 0.0,
                node,
            })
            .collect();

        while let Some(State { distance, node }) = heap.pop() {
            if settled.contains_key(&node) || distance > max_m {
                continue;
            }
            settled.insert(node, distance);

            for edge in self.adjacency[node].iter().map(|&e| &self.edges[e]) {
                let next = edge.other(node);
                let reached = distance + edge.length_m;
                if !settled.contains_key(&next) && reached <= max_m {
                    on_edge(edge, reached);
                    heap.push(State {
                        distance: reached,
                        node: next,
                    });
                }
            }
        }

        settled
    }

    /// Reach polygon from the `k` nodes nearest to `origin` within `max_m`
    /// meters of network distance. `None` when no edge was reached.
    #[must_use]
    pub fn reach(&self, origin: Point<f64>, k: usize, max_m: f64) -> Option<MultiPolygon<f64>> {
        if max_m <= 0.0 {
            return None;
        }
        let sources = self.nearest_nodes(origin, k);
        let mut buffers: Vec<MultiPolygon<f64>> = Vec::new();

        self.search(&sources, max_m, |edge, reached| {
            let radius = EDGE_BUFFER_M * (max_m - reached) / max_m;
            if radius <= 0.0 {
                return;
            }
            let line = LineString::new(vec![self.nodes[edge.a], self.nodes[edge.b]]);
            buffers.push(buffer_line(&line, radius, DEFAULT_QUADRANT_SEGMENTS));
        });

        if buffers.is_empty() {
            return None;
        }
        let merged = geo::unary_union(&buffers);
        (!merged.0.is_empty()).then_some(merged)
    }

    /// Subgraph of the edges whose bounding box meets the square of half
    /// side `radius_m` around `center`.
    #[must_use]
    pub fn around(&self, center: Point<f64>, radius_m: f64) -> Self {
        let projection = LocalProjection::around(center);
        let low = projection.inverse(Coord {
            x: -radius_m,
            y: -radius_m,
        });
        let high = projection.inverse(Coord {
            x: radius_m,
            y: radius_m,
        });
        let window = AABB::from_corners([low.x, low.y], [high.x, high.y]);

        let lines: Vec<LineString<f64>> = self
            .edges
            .iter()
            .filter(|edge| {
                let (a, b) = (self.nodes[edge.a], self.nodes[edge.b]);
                let bbox = AABB::from_corners([a.x.min(b.x), a.y.min(b.y)], [a.x.max(b.x), a.y.max(b.y)]);
                rstar::Envelope::intersects(&window, &bbox)
            })
            .map(|edge| LineString::new(vec![self.nodes[edge.a], self.nodes[edge.b]]))
            .collect();
        Self::from_lines(&lines)
    }
}

/// Number of start nodes for a shelter of the given `scale` attribute.
#[must_use]
pub const fn start_node_count(scale: Option<i64>) -> usize {
    match scale {
        Some(-1) => 1,
        _ => 3,
    }
}

/// Walking reach polygon of a shelter.
///
/// Uses the road network around the shelter when one is given and reaches
/// at least one edge; otherwise falls back to a circle of `threshold_m`.
#[must_use]
pub fn shelter_reach(
    graph: Option<&RoadGraph>,
    shelter: Point<f64>,
    scale: Option<i64>,
    threshold_m: f64,
) -> MultiPolygon<f64> {
    graph
        .map(|g| g.around(shelter, threshold_m))
        .filter(|local| !local.is_empty())
        .and_then(|local| local.reach(shelter, start_node_count(scale), threshold_m))
        .unwrap_or_else(|| {
            MultiPolygon::new(vec![circle(shelter, threshold_m, DEFAULT_QUADRANT_SEGMENTS)])
        })
}
