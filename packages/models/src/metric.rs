//! Metric values, rows and tables produced by the calculators.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Year;

/// Marker written for values that cannot be computed.
pub const NOT_AVAILABLE: &str = "―";

/// A single exported statistic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    /// Whole-number count.
    Int(i64),
    /// Rounded real value.
    Number(f64),
    /// Denominator was zero or an input was missing.
    NotAvailable,
}

impl MetricValue {
    /// Rounds `value` to `digits` decimals, mapping non-finite values to
    /// [`MetricValue::NotAvailable`].
    #[must_use]
    pub fn rounded(value: f64, digits: i32) -> Self {
        if value.is_finite() {
            Self::Number(round(value, digits))
        } else {
            Self::NotAvailable
        }
    }

    /// `100 * part / whole` rounded to `digits`; unavailable when `whole` is 0.
    #[must_use]
    pub fn rate(part: f64, whole: f64, digits: i32) -> Self {
        if whole == 0.0 {
            Self::NotAvailable
        } else {
            Self::rounded(100.0 * part / whole, digits)
        }
    }

    /// Percentage change `(current - previous) / previous * 100`, one decimal.
    #[must_use]
    pub fn change(current: Self, previous: Self) -> Self {
        match (current.as_f64(), previous.as_f64()) {
            (Some(cur), Some(prev)) if prev != 0.0 => Self::rounded((cur - prev) / prev * 100.0, 1),
            _ => Self::NotAvailable,
        }
    }

    /// Numeric view; `None` when unavailable.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(v as f64),
            Self::Number(v) => Some(v),
            Self::NotAvailable => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Number(v) => write!(f, "{v}"),
            Self::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<Option<f64>> for MetricValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Self::NotAvailable, |v| Self::rounded(v, 2))
    }
}

/// Rounds half away from zero to `digits` decimals.
#[must_use]
pub fn round(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// One `(unit, metric, year) -> value` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Spatial aggregation unit.
    pub unit: String,
    /// Metric column name.
    pub metric: String,
    /// Year the value belongs to.
    pub year: Year,
    /// Computed value.
    pub value: MetricValue,
}

/// All metrics of one year for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    /// Year of the row.
    pub year: Year,
    /// Values in insertion order.
    pub values: Vec<(String, MetricValue)>,
}

impl MetricRow {
    /// Creates an empty row.
    #[must_use]
    pub const fn new(year: Year) -> Self {
        Self {
            year,
            values: Vec::new(),
        }
    }

    /// Sets `column`, replacing an earlier value for the same column.
    pub fn set(&mut self, column: &str, value: impl Into<MetricValue>) {
        let value = value.into();
        if let Some(slot) = self.values.iter_mut().find(|(c, _)| c == column) {
            slot.1 = value;
        } else {
            self.values.push((column.to_string(), value));
        }
    }

    /// Looks up a column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<MetricValue> {
        self.values
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| *v)
    }
}

/// A calculator's output, one row per year.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricTable {
    /// Spatial unit the rows describe.
    pub unit: String,
    /// Output file name.
    pub file_name: String,
    /// Column order: `Year` followed by metrics in first-seen order.
    pub columns: Vec<String>,
    /// Rows ordered by year.
    pub rows: Vec<MetricRow>,
}

impl MetricTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new(unit: &str, file_name: &str) -> Self {
        Self {
            unit: unit.to_string(),
            file_name: file_name.to_string(),
            columns: vec!["Year".to_string()],
            rows: Vec::new(),
        }
    }

    /// Inserts a row; a row for the same year is replaced.
    pub fn push(&mut self, row: MetricRow) {
        for (column, _) in &row.values {
            if !self.columns.iter().any(|c| c == column) {
                self.columns.push(column.clone());
            }
        }
        match self.rows.binary_search_by_key(&row.year, |r| r.year) {
            Ok(idx) => self.rows[idx] = row,
            Err(idx) => self.rows.insert(idx, row),
        }
    }

    /// Row for `year`, if any.
    #[must_use]
    pub fn row(&self, year: Year) -> Option<&MetricRow> {
        self.rows.iter().find(|r| r.year == year)
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Flattens the table into unique `(unit, metric, year)` records.
    #[must_use]
    pub fn records(&self) -> Vec<MetricRecord> {
        self.rows
            .iter()
            .flat_map(|row| {
                row.values.iter().map(|(metric, value)| MetricRecord {
                    unit: self.unit.clone(),
                    metric: metric.clone(),
                    year: row.year,
                    value: *value,
                })
            })
            .collect()
    }
}
