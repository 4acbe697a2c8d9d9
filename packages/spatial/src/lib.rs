#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry operations shared by the ingestors and calculators.
//!
//! All layers are stored in WGS84 longitude/latitude. Operations that need
//! metric distances (buffers, areas, road network search) work in a local
//! equirectangular projection from [`measure::LocalProjection`], which is
//! accurate to well under a percent at city scale.

pub mod buffer;
pub mod convert;
pub mod dissolve;
pub mod hazard;
pub mod index;
pub mod measure;
pub mod network;
pub mod repair;

pub use index::{PointIndex, PolygonIndex};

use plateau_stats_models::ErrorKind;

/// Errors produced by geometry operations.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// The geometry collapsed to nothing usable.
    #[error("Degenerate geometry: {reason}")]
    Degenerate {
        /// What was wrong.
        reason: String,
    },

    /// The operation expected a point.
    #[error("Geometry is not a Point: {found}")]
    NotPoint {
        /// Geometry type that was found instead.
        found: String,
    },

    /// The geometry type is not handled by this operation.
    #[error("Unsupported geometry type: {found}")]
    Unsupported {
        /// Geometry type that was found.
        found: String,
    },
}

impl SpatialError {
    /// Classifies this error in the shared taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Degenerate { .. } | Self::NotPoint { .. } => ErrorKind::Geometry,
            Self::Unsupported { .. } => ErrorKind::Format,
        }
    }

    pub(crate) fn degenerate(reason: impl Into<String>) -> Self {
        Self::Degenerate {
            reason: reason.into(),
        }
    }
}

/// Short type name of a geometry, for messages.
#[must_use]
pub const fn geometry_type_name(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}
