//! Loosely-typed attribute values carried by layer features.
//!
//! Source tables mix integers, reals, and text in the same column depending
//! on the survey year, so attributes are stored as an untagged enum and
//! coerced at the point of use.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Attribute map of a single feature, ordered by field name.
pub type Attributes = BTreeMap<String, AttrValue>;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Missing value.
    #[default]
    Null,
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Real(f64),
    /// Text value.
    Text(String),
}

/// Shared null used when a lookup misses.
pub static NULL: AttrValue = AttrValue::Null;

impl AttrValue {
    /// Returns `true` for [`AttrValue::Null`] and blank text.
    #[must_use]
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Int(_) | Self::Real(_) => false,
        }
    }

    /// Numeric view of the value. Text is parsed after trimming.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Null => None,
            Self::Int(v) => Some(*v as f64),
            Self::Real(v) => v.is_finite().then_some(*v),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }

    /// Integer view of the value. Reals are truncated toward zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Null => None,
            Self::Int(v) => Some(*v),
            Self::Real(v) => v.is_finite().then_some(v.trunc() as i64),
            Self::Text(s) => {
                let trimmed = s.trim();
                trimmed.parse::<i64>().ok().or_else(|| {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .filter(|v| v.is_finite())
                        .map(|v| v.trunc() as i64)
                })
            }
        }
    }

    /// Borrowed text view; only [`AttrValue::Text`] yields a value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Int(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        if v.is_finite() { Self::Real(v) } else { Self::Null }
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for AttrValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_coercions() {
        assert_eq!(AttrValue::Text(" 42 ".into()).as_i64(), Some(42));
        assert_eq!(AttrValue::Text("3.9".into()).as_i64(), Some(3));
        assert_eq!(AttrValue::Real(2.5).as_f64(), Some(2.5));
        assert_eq!(AttrValue::Int(7).as_f64(), Some(7.0));
        assert_eq!(AttrValue::Text("*".into()).as_f64(), None);
        assert_eq!(AttrValue::Null.as_i64(), None);
    }

    #[test]
    fn blank_text_counts_as_null() {
        assert!(AttrValue::Text("   ".into()).is_null());
        assert!(!AttrValue::Int(0).is_null());
    }

    #[test]
    fn non_finite_reals_become_null() {
        assert_eq!(AttrValue::from(f64::NAN), AttrValue::Null);
    }

    #[test]
    fn untagged_json_round_trip_keeps_variants() {
        let mut attrs = Attributes::new();
        attrs.insert("a".into(), AttrValue::Int(1));
        attrs.insert("b".into(), AttrValue::Real(1.5));
        attrs.insert("c".into(), AttrValue::Text("x".into()));
        attrs.insert("d".into(), AttrValue::Null);

        let json = serde_json::to_string(&attrs).unwrap();
        let back: Attributes = serde_json::from_str(&json).unwrap();
        assert_eq!(back, attrs);
    }
}
