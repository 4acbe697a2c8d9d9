//! Hazard kinds and scale classes.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// A category of hazard area.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HazardKind {
    /// River flooding, split across the planned and maximum scale layers.
    RiverFlood,
    /// Storm surge inundation.
    StormSurge,
    /// Tsunami inundation.
    Tsunami,
    /// Sediment disaster warning areas.
    Landslide,
    /// House-collapse floodplain flow areas.
    Floodplain,
}

impl HazardKind {
    /// Layers whose polygons belong to this kind.
    #[must_use]
    pub const fn layer_names(self) -> &'static [&'static str] {
        match self {
            Self::RiverFlood => &["hazard_area_planned_scales", "hazard_area_maximum_scales"],
            Self::StormSurge => &["hazard_area_storm_surges"],
            Self::Tsunami => &["hazard_area_tsunamis"],
            Self::Landslide => &["hazard_area_landslides"],
            Self::Floodplain => &["hazard_area_floodplains"],
        }
    }

    /// Column written on the composite layer.
    #[must_use]
    pub const fn composite_column(self) -> &'static str {
        match self {
            Self::RiverFlood => "hazard_river_flood",
            Self::StormSurge => "hazard_storm_surge",
            Self::Tsunami => "hazard_tsunami",
            Self::Landslide => "hazard_landslide",
            Self::Floodplain => "hazard_floodplain",
        }
    }
}

/// Column holding the maximum class over every kind.
pub const WORST_COLUMN: &str = "hazard_worst";

/// Attribute carrying the scale class on hazard area layers.
pub const SCALE_FIELD: &str = "scale_class";

/// Scale class of a hazard polygon; larger is more severe.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScaleClass {
    /// Planned-scale scenario.
    Planned = 1,
    /// Assumed maximum scenario.
    Maximum = 2,
}

impl ScaleClass {
    /// Numeric class stored in composite columns.
    #[must_use]
    pub const fn code(self) -> i64 {
        self as i64
    }

    /// Parses a stored class code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Planned),
            2 => Some(Self::Maximum),
            _ => None,
        }
    }

    /// Classifies a source path by its scale token, defaulting to maximum.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        if path.contains("計画規模") {
            Self::Planned
        } else {
            Self::Maximum
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_classes_order_by_severity() {
        assert!(ScaleClass::Maximum > ScaleClass::Planned);
        assert_eq!(ScaleClass::Planned.code(), 1);
        assert_eq!(ScaleClass::from_code(2), Some(ScaleClass::Maximum));
        assert_eq!(ScaleClass::from_code(0), None);
    }

    #[test]
    fn path_token_selects_scale() {
        assert_eq!(
            ScaleClass::from_path("ハザードエリア計画規模/foo.shp"),
            ScaleClass::Planned
        );
        assert_eq!(
            ScaleClass::from_path("ハザードエリア想定最大規模/foo.shp"),
            ScaleClass::Maximum
        );
        assert_eq!(ScaleClass::from_path("tsunami/foo.shp"), ScaleClass::Maximum);
    }

    #[test]
    fn kind_names_are_snake_case() {
        assert_eq!(HazardKind::StormSurge.to_string(), "storm_surge");
        assert_eq!(HazardKind::RiverFlood.composite_column(), "hazard_river_flood");
    }
}
