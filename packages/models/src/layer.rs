//! Normalized vector layers.

use std::collections::BTreeSet;

use geo::Geometry;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::attr::{AttrValue, Attributes, NULL};
use crate::Year;

/// Coordinate reference identifier used for every stored layer.
pub const WGS84: &str = "EPSG:4326";

/// The primitive geometry type a layer holds.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GeometryKind {
    /// Points (stations, stops, facilities, building centroids).
    Point,
    /// Line strings (road, railway and bus networks).
    LineString,
    /// Polygons (footprints, meshes, zones, buffers, hazard areas).
    Polygon,
    /// Attribute-only table.
    None,
}

impl GeometryKind {
    /// Whether `geometry` is acceptable for a layer of this kind.
    ///
    /// Multi-part variants are accepted alongside their single-part form.
    #[must_use]
    pub const fn accepts(self, geometry: &Geometry<f64>) -> bool {
        matches!(
            (self, geometry),
            (Self::Point, Geometry::Point(_) | Geometry::MultiPoint(_))
                | (
                    Self::LineString,
                    Geometry::LineString(_) | Geometry::MultiLineString(_) | Geometry::Line(_)
                )
                | (Self::Polygon, Geometry::Polygon(_) | Geometry::MultiPolygon(_))
        )
    }
}

/// One record of a layer: optional geometry plus attributes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Feature {
    /// Geometry in layer coordinates.
    pub geometry: Option<Geometry<f64>>,
    /// Attribute values keyed by field name.
    pub attributes: Attributes,
}

impl Feature {
    /// Creates a feature with the given geometry and no attributes.
    #[must_use]
    pub fn new(geometry: impl Into<Option<Geometry<f64>>>) -> Self {
        Self {
            geometry: geometry.into(),
            attributes: Attributes::new(),
        }
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Sets (or overwrites) an attribute.
    pub fn set(&mut self, key: &str, value: impl Into<AttrValue>) {
        self.attributes.insert(key.to_string(), value.into());
    }

    /// Returns the attribute value, or null when absent.
    #[must_use]
    pub fn get(&self, key: &str) -> &AttrValue {
        self.attributes.get(key).unwrap_or(&NULL)
    }

    /// Numeric attribute, treating absent or unparsable values as `None`.
    #[must_use]
    pub fn f64(&self, key: &str) -> Option<f64> {
        self.get(key).as_f64()
    }

    /// Integer attribute, treating absent or unparsable values as `None`.
    #[must_use]
    pub fn i64(&self, key: &str) -> Option<i64> {
        self.get(key).as_i64()
    }

    /// Text rendering of an attribute; empty for null.
    #[must_use]
    pub fn text(&self, key: &str) -> String {
        self.get(key).to_string()
    }
}

/// A named collection of features sharing one geometry kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// Unique name within the container.
    pub name: String,
    /// Geometry kind of every feature.
    pub kind: GeometryKind,
    /// Coordinate reference identifier.
    pub crs: String,
    /// Year tag for single-year layers.
    pub year: Option<Year>,
    /// Ordered attribute schema.
    pub fields: Vec<String>,
    /// Features in insertion order.
    pub features: Vec<Feature>,
}

impl Layer {
    /// Creates an empty WGS84 layer.
    #[must_use]
    pub fn new(name: &str, kind: GeometryKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            crs: WGS84.to_string(),
            year: None,
            fields: Vec::new(),
            features: Vec::new(),
        }
    }

    /// Declares the attribute schema up front.
    #[must_use]
    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        for field in fields {
            self.ensure_field(field);
        }
        self
    }

    /// Adds `field` to the schema if it is not present yet.
    pub fn ensure_field(&mut self, field: &str) {
        if !self.has_field(field) {
            self.fields.push(field.to_string());
        }
    }

    /// Whether the schema contains `field`.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    /// Appends a feature, extending the schema with any new attribute keys.
    pub fn push(&mut self, feature: Feature) {
        for key in feature.attributes.keys() {
            if !self.has_field(key) {
                self.fields.push(key.clone());
            }
        }
        self.features.push(feature);
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the layer has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Years `Y` for which a `{Y}_{suffix}` field exists, ascending.
    #[must_use]
    pub fn years_with_suffix(&self, suffix: &str) -> BTreeSet<Year> {
        self.fields
            .iter()
            .filter_map(|field| {
                let (head, tail) = field.split_once('_')?;
                if tail != suffix || head.len() != 4 {
                    return None;
                }
                head.parse::<Year>().ok()
            })
            .collect()
    }

    /// Distinct non-null values of an attribute, parsed as years.
    #[must_use]
    pub fn year_values(&self, field: &str) -> BTreeSet<Year> {
        self.features
            .iter()
            .filter_map(|f| {
                f.i64(field)
                    .and_then(|v| u16::try_from(v).ok())
                    .filter(|v| (1000..=9999).contains(v))
                    .map(Year)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Point, polygon};

    #[test]
    fn push_extends_schema_in_first_seen_order() {
        let mut layer = Layer::new("zones", GeometryKind::Polygon).with_fields(&["key_code"]);
        layer.push(Feature::default().with("city", "A").with("key_code", "1"));
        layer.push(Feature::default().with("pref", "B"));
        assert_eq!(layer.fields, vec!["key_code", "city", "pref"]);
        assert_eq!(layer.len(), 2);
    }

    #[test]
    fn years_with_suffix_ignores_other_fields() {
        let layer = Layer::new("meshes", GeometryKind::Polygon).with_fields(&[
            "key_code",
            "2015_population",
            "2020_population",
            "2020_male",
            "future_2040_PT0",
            "population_diff_2020",
        ]);
        let years: Vec<u16> = layer
            .years_with_suffix("population")
            .into_iter()
            .map(Year::value)
            .collect();
        assert_eq!(years, vec![2015, 2020]);
    }

    #[test]
    fn kind_accepts_multi_variants() {
        let poly = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)];
        assert!(GeometryKind::Polygon.accepts(&Geometry::Polygon(poly)));
        assert!(!GeometryKind::Polygon.accepts(&Geometry::Point(Point::new(0.0, 0.0))));
        assert!(GeometryKind::Point.accepts(&Geometry::Point(Point::new(0.0, 0.0))));
    }

    #[test]
    fn missing_attribute_reads_as_null() {
        let feature = Feature::default();
        assert!(feature.get("anything").is_null());
        assert_eq!(feature.text("anything"), "");
    }
}
