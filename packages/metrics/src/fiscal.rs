//! `IF106`: land prices inside and outside the residential induction area.

use std::collections::BTreeMap;

use geo::{Centroid, Point};
use plateau_stats_ingest::area::INDUCTION_LAYER;
use plateau_stats_ingest::{financial, zone};
use plateau_stats_models::{Layer, MetricRow, MetricTable, MetricValue, Year};
use plateau_stats_store::SpatialContainerStore;

use crate::context::{Region, require};
use crate::{Calculator, MetricCalculator, MetricError};

/// Computes `IF106`.
pub struct Fiscal;

impl MetricCalculator for Fiscal {
    fn calculator(&self) -> Calculator {
        Calculator::Fiscal
    }

    fn calculate(&self, store: &SpatialContainerStore) -> Result<MetricTable, MetricError> {
        let prices = require(store, financial::LAYER)?;
        let zones = require(store, zone::LAYER)?;
        let induction = require(store, INDUCTION_LAYER)?;
        Ok(fiscal_table(
            &prices,
            &Region::from_layer(&zones),
            &Region::residential(&induction),
        ))
    }
}

/// Prices of one survey year, split by location.
#[derive(Debug, Default)]
struct YearPrices {
    all: Vec<i64>,
    inside: Vec<i64>,
    outside: Vec<i64>,
}

#[allow(clippy::cast_precision_loss)]
fn average(prices: &[i64]) -> MetricValue {
    if prices.is_empty() {
        return MetricValue::NotAvailable;
    }
    let sum: i64 = prices.iter().sum();
    MetricValue::rounded(sum as f64 / prices.len() as f64, 1)
}

/// Builds the table from land price points, keeping those inside `zones`.
#[must_use]
pub fn fiscal_table(prices: &Layer, zones: &Region, residential: &Region) -> MetricTable {
    let mut by_year: BTreeMap<Year, YearPrices> = BTreeMap::new();
    for feature in &prices.features {
        let Some(point) = feature
            .geometry
            .as_ref()
            .and_then(Centroid::centroid)
            .filter(|p: &Point<f64>| zones.contains(*p))
        else {
            continue;
        };
        let (Some(year), Some(price)) = (
            feature
                .i64("year")
                .and_then(|y| u16::try_from(y).ok())
                .map(Year),
            feature.i64("public_land_price"),
        ) else {
            continue;
        };
        let entry = by_year.entry(year).or_default();
        entry.all.push(price);
        if residential.contains(point) {
            entry.inside.push(price);
        } else {
            entry.outside.push(price);
        }
    }

    let mut table = Calculator::Fiscal.table("city");
    let mut previous_total: Option<MetricValue> = None;
    let mut last_inside = MetricValue::NotAvailable;
    let mut last_outside = MetricValue::NotAvailable;

    for (year, prices) in by_year {
        let total = MetricValue::Int(prices.all.iter().sum());
        let inside = average(&prices.inside);
        let outside = average(&prices.outside);

        let mut row = MetricRow::new(year);
        row.set("Total_Land_Price", total);
        row.set(
            "Rate_Land_Price",
            previous_total.map_or(MetricValue::NotAvailable, |prev| {
                MetricValue::change(total, prev)
            }),
        );
        row.set("Average_Residential_Area_Land_Price", inside);
        row.set(
            "Rate_Change_Residential_Area_Land_Price",
            MetricValue::change(inside, last_inside),
        );
        row.set("Average_Residential_Area_Outside_Land_Price", outside);
        row.set(
            "Rate_Change_Residential_Area_Outside_Land_Price",
            MetricValue::change(outside, last_outside),
        );
        table.push(row);

        previous_total = Some(total);
        if inside.as_f64().is_some() {
            last_inside = inside;
        }
        if outside.as_f64().is_some() {
            last_outside = outside;
        }
    }
    table
}
