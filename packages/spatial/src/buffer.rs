//! Metric buffers around points and lines.

use std::f64::consts::{FRAC_PI_2, PI};

use geo::{Coord, Geometry, LineString, MultiPolygon, Point, Polygon};

use crate::SpatialError;
use crate::measure::{EARTH_RADIUS_M, LocalProjection};

/// Vertices per quarter circle used for station and stop buffers.
pub const DEFAULT_QUADRANT_SEGMENTS: usize = 5;

/// Circular buffer of `radius_m` meters around a lon/lat point.
///
/// Every vertex is placed with the spherical destination formula, so each
/// boundary vertex lies exactly `radius_m` from `center` along a great
/// circle.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn circle(center: Point<f64>, radius_m: f64, quadrant_segments: usize) -> Polygon<f64> {
    let steps = 4 * quadrant_segments.max(1);
    let delta = radius_m / EARTH_RADIUS_M;
    let (lat1, lon1) = (center.y().to_radians(), center.x().to_radians());

    let ring: Vec<Coord<f64>> = (0..=steps)
        .map(|i| {
            let bearing = 2.0 * PI * (i % steps) as f64 / steps as f64;
            let lat2 =
                (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * bearing.cos()).asin();
            let lon2 = lon1
                + (bearing.sin() * delta.sin() * lat1.cos())
                    .atan2(delta.cos() - lat1.sin() * lat2.sin());
            Coord {
                x: lon2.to_degrees(),
                y: lat2.to_degrees(),
            }
        })
        .collect();

    Polygon::new(LineString::new(ring), Vec::new())
}

/// Buffer of `radius_m` meters around a lon/lat line string: the union of
/// one capsule per segment.
#[must_use]
pub fn buffer_line(
    line: &LineString<f64>,
    radius_m: f64,
    quadrant_segments: usize,
) -> MultiPolygon<f64> {
    let Some(projection) = LocalProjection::for_geometry(&Geometry::LineString(line.clone()))
    else {
        return MultiPolygon::new(Vec::new());
    };

    let capsules: Vec<Polygon<f64>> = line
        .lines()
        .map(|segment| {
            capsule(
                projection.forward(segment.start),
                projection.forward(segment.end),
                radius_m,
                quadrant_segments,
            )
        })
        .collect();

    let merged = if capsules.is_empty() {
        line.0.first().map_or_else(
            || MultiPolygon::new(Vec::new()),
            |c| {
                MultiPolygon::new(vec![capsule(
                    projection.forward(*c),
                    projection.forward(*c),
                    radius_m,
                    quadrant_segments,
                )])
            },
        )
    } else {
        geo::unary_union(&capsules)
    };

    match projection.inverse_geometry(&Geometry::MultiPolygon(merged)) {
        Geometry::MultiPolygon(mp) => mp,
        _ => MultiPolygon::new(Vec::new()),
    }
}

/// Buffers a point or line geometry.
///
/// # Errors
///
/// * [`SpatialError::Unsupported`] for polygon and collection inputs
pub fn buffer_geometry(
    geometry: &Geometry<f64>,
    radius_m: f64,
    quadrant_segments: usize,
) -> Result<MultiPolygon<f64>, SpatialError> {
    match geometry {
        Geometry::Point(p) => Ok(MultiPolygon::new(vec![circle(
            *p,
            radius_m,
            quadrant_segments,
        )])),
        Geometry::MultiPoint(mp) => {
            let circles: Vec<Polygon<f64>> = mp
                .iter()
                .map(|p| circle(*p, radius_m, quadrant_segments))
                .collect();
            Ok(geo::unary_union(&circles))
        }
        Geometry::LineString(ls) => Ok(buffer_line(ls, radius_m, quadrant_segments)),
        Geometry::MultiLineString(mls) => {
            let parts: Vec<MultiPolygon<f64>> = mls
                .iter()
                .map(|ls| buffer_line(ls, radius_m, quadrant_segments))
                .collect();
            Ok(geo::unary_union(&parts))
        }
        other => Err(SpatialError::Unsupported {
            found: crate::geometry_type_name(other).to_string(),
        }),
    }
}

/// Planar capsule (stadium) around segment `a`-`b` in projected meters.
#[allow(clippy::cast_precision_loss)]
fn capsule(a: Coord<f64>, b: Coord<f64>, radius: f64, quadrant_segments: usize) -> Polygon<f64> {
    let steps = 2 * quadrant_segments.max(1);
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let heading = if dx == 0.0 && dy == 0.0 {
        0.0
    } else {
        dy.atan2(dx)
    };

    let mut ring = Vec::with_capacity(2 * steps + 3);
    // Cap around `b` sweeps from the right-hand normal to the left-hand one.
    for i in 0..=steps {
        let angle = heading - FRAC_PI_2 + PI * i as f64 / steps as f64;
        ring.push(Coord {
            x: b.x + radius * angle.cos(),
            y: b.y + radius * angle.sin(),
        });
    }
    for i in 0..=steps {
        let angle = heading + FRAC_PI_2 + PI * i as f64 / steps as f64;
        ring.push(Coord {
            x: a.x + radius * angle.cos(),
            y: a.y + radius * angle.sin(),
        });
    }
    ring.push(ring[0]);

    Polygon::new(LineString::new(ring), Vec::new())
}
