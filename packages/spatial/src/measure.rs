//! Distances and areas on the sphere.

use geo::{Area, BoundingRect, Centroid, Coord, Geometry, LineString, MapCoords, Point};

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Square meters per hectare.
pub const SQM_PER_HA: f64 = 10_000.0;

/// Great-circle distance between two lon/lat points, in meters.
#[must_use]
pub fn haversine_m(a: Point<f64>, b: Point<f64>) -> f64 {
    let (lat1, lat2) = (a.y().to_radians(), b.y().to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.x() - a.x()).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Length of a lon/lat line string in meters.
#[must_use]
pub fn length_m(line: &LineString<f64>) -> f64 {
    line.lines()
        .map(|l| haversine_m(l.start.into(), l.end.into()))
        .sum()
}

/// Area of a lon/lat geometry in hectares.
#[must_use]
pub fn area_ha(geometry: &Geometry<f64>) -> f64 {
    let Some(center) = geometry.centroid() else {
        return 0.0;
    };
    let projection = LocalProjection::around(center);
    projection.forward_geometry(geometry).unsigned_area() / SQM_PER_HA
}

/// Equirectangular projection centered on a reference point, in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalProjection {
    origin: Coord<f64>,
    meters_per_deg_x: f64,
    meters_per_deg_y: f64,
}

impl LocalProjection {
    /// Projection centered on `origin` (lon/lat).
    #[must_use]
    pub fn around(origin: Point<f64>) -> Self {
        let meters_per_deg_y = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        Self {
            origin: origin.0,
            meters_per_deg_x: meters_per_deg_y * origin.y().to_radians().cos(),
            meters_per_deg_y,
        }
    }

    /// Projection centered on the middle of `geometry`'s bounding box.
    #[must_use]
    pub fn for_geometry(geometry: &Geometry<f64>) -> Option<Self> {
        geometry
            .bounding_rect()
            .map(|r| Self::around(Point::from(r.center())))
    }

    /// Lon/lat to local meters.
    #[must_use]
    pub fn forward(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: (c.x - self.origin.x) * self.meters_per_deg_x,
            y: (c.y - self.origin.y) * self.meters_per_deg_y,
        }
    }

    /// Local meters to lon/lat.
    #[must_use]
    pub fn inverse(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: c.x / self.meters_per_deg_x + self.origin.x,
            y: c.y / self.meters_per_deg_y + self.origin.y,
        }
    }

    /// Projects a whole geometry to local meters.
    #[must_use]
    pub fn forward_geometry(&self, geometry: &Geometry<f64>) -> Geometry<f64> {
        geometry.map_coords(|c| self.forward(c))
    }

    /// Unprojects a whole geometry back to lon/lat.
    #[must_use]
    pub fn inverse_geometry(&self, geometry: &Geometry<f64>) -> Geometry<f64> {
        geometry.map_coords(|c| self.inverse(c))
    }
}
