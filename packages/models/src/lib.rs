#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the plateau-stats toolchain.
//!
//! Every stage of the pipeline speaks in terms of [`Layer`]s made of
//! [`Feature`]s with loosely-typed [`AttrValue`] attributes, keyed where
//! applicable by [`Year`]. Metric calculators produce [`MetricTable`]s.

pub mod attr;
pub mod hazard;
pub mod layer;
pub mod metric;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

pub use attr::{AttrValue, Attributes};
pub use hazard::{HazardKind, ScaleClass};
pub use layer::{Feature, GeometryKind, Layer, WGS84};
pub use metric::{MetricRecord, MetricRow, MetricTable, MetricValue};

/// A four-digit calendar year used to key multi-year records.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Year(pub u16);

impl Year {
    /// Returns the year as a plain integer.
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Returns the year as an `i64` for attribute storage.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        i64::from(self.0)
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Year {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u16>().map(Self)
    }
}

/// Classification shared by every crate-level error type.
///
/// The pipeline worker decides whether a stage error is fatal by looking at
/// its kind rather than its concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
pub enum ErrorKind {
    /// A required dataset, layer, or field is absent.
    MissingInput,
    /// Text could not be decoded with the primary or fallback encoding.
    Encoding,
    /// Unsupported geometry type or malformed source structure.
    Format,
    /// Geometry is empty or degenerate after repair.
    Geometry,
    /// The spatial container could not be created or written.
    Persistence,
    /// The export produced no rows or failed to write.
    Export,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_parses_and_orders() {
        let a: Year = "2015".parse().unwrap();
        let b: Year = " 2020 ".parse().unwrap();
        assert!(a < b);
        assert_eq!(b.to_string(), "2020");
        assert!("20x0".parse::<Year>().is_err());
    }

    #[test]
    fn year_serializes_as_plain_number() {
        let json = serde_json::to_string(&Year(2024)).unwrap();
        assert_eq!(json, "2024");
    }
}
