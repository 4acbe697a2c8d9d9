//! `IF102`: population and urban facilities in the urban function
//! induction area.

use std::collections::BTreeSet;

use geo::Centroid;
use plateau_stats_ingest::facility::{self, kind};
use plateau_stats_ingest::area;
use plateau_stats_models::metric::round;
use plateau_stats_models::{Feature, Layer, MetricRow, MetricTable, MetricValue, Year};
use plateau_stats_store::SpatialContainerStore;

use crate::context::{Buildings, Region, changes, density, rate, require};
use crate::{Calculator, MetricCalculator, MetricError};

/// Facility type codes in column order.
pub const FACILITY_TYPES: [i64; 7] = [
    kind::ADMINISTRATIVE,
    kind::COMMERCIAL,
    kind::MEDICAL,
    kind::CHILDCARE,
    kind::WELFARE,
    kind::SCHOOL,
    kind::CULTURAL,
];

/// Computes `IF102`.
pub struct UrbanFunctionInduction;

impl MetricCalculator for UrbanFunctionInduction {
    fn calculator(&self) -> Calculator {
        Calculator::UrbanFunctionInduction
    }

    fn calculate(&self, store: &SpatialContainerStore) -> Result<MetricTable, MetricError> {
        let buildings = Buildings::load(store)?;
        let induction = require(store, area::INDUCTION_LAYER)?;
        let facilities = require(store, facility::LAYER)?;
        Ok(urban_function_table(&buildings, &induction, &facilities))
    }
}

fn facility_year(feature: &Feature) -> Option<Year> {
    feature
        .i64("year")
        .and_then(|v| u16::try_from(v).ok())
        .map(Year)
}

/// Facilities of one type counted city-wide and inside the area.
struct FacilityCounter<'a> {
    facilities: &'a Layer,
    inside: Vec<bool>,
}

impl<'a> FacilityCounter<'a> {
    fn new(facilities: &'a Layer, region: &Region) -> Self {
        let inside = facilities
            .features
            .iter()
            .map(|f| {
                f.geometry
                    .as_ref()
                    .and_then(Centroid::centroid)
                    .is_some_and(|p| region.contains(p))
            })
            .collect();
        Self { facilities, inside }
    }

    fn of_type(&self, facility_type: i64) -> impl Iterator<Item = (usize, &'a Feature)> + '_ {
        self.facilities
            .features
            .iter()
            .enumerate()
            .filter(move |(_, f)| f.i64("type") == Some(facility_type))
    }

    /// City-wide count for `year`: the survey of that year, else the latest
    /// earlier survey, else the undated records.
    fn city(&self, facility_type: i64, year: Year) -> i64 {
        let surveys: BTreeSet<Year> = self
            .of_type(facility_type)
            .filter_map(|(_, f)| facility_year(f))
            .collect();
        let survey = if surveys.contains(&year) {
            Some(year)
        } else {
            surveys.range(..year).next_back().copied()
        };
        count(self.of_type(facility_type).filter(|(_, f)| facility_year(f) == survey))
    }

    /// Count inside the area of facilities undated or dated up to `year`.
    fn area(&self, facility_type: i64, year: Year) -> i64 {
        count(
            self.of_type(facility_type)
                .filter(|(i, _)| self.inside[*i])
                .filter(|(_, f)| facility_year(f).is_none_or(|y| y <= year)),
        )
    }
}

fn count<T>(items: impl Iterator<Item = T>) -> i64 {
    i64::try_from(items.count()).unwrap_or(i64::MAX)
}

fn column(prefix: &str, facility_type: i64) -> String {
    format!("{prefix}_{facility_type:02}")
}

/// Shares of each type among the area's facilities, adjusted so they add
/// up to exactly 100.
fn shares(counts: &[i64]) -> Vec<MetricValue> {
    let total: i64 = counts.iter().sum();
    if total == 0 {
        return vec![MetricValue::NotAvailable; counts.len()];
    }
    let mut values: Vec<f64> = counts
        .iter()
        .map(|&c| rate(c, total, 2).as_f64().unwrap_or(0.0))
        .collect();
    let residual = round(100.0 - values.iter().sum::<f64>(), 2);
    if residual != 0.0 {
        let largest = values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        if let Some(i) = largest {
            values[i] = round(values[i] + residual, 2);
        }
    }
    values.into_iter().map(MetricValue::Number).collect()
}

/// Builds the table from loaded layers.
#[must_use]
pub fn urban_function_table(buildings: &Buildings, induction: &Layer, facilities: &Layer) -> MetricTable {
    let region = Region::urban_function(induction);
    let inside = buildings.inside(&region);
    let area_ha = round(region.hectares(), 1);
    let counter = FacilityCounter::new(facilities, &region);

    let mut table = Calculator::UrbanFunctionInduction.table("urban function induction area");
    let mut previous: Option<MetricRow> = None;

    for &year in &buildings.years {
        let total = buildings.total_population(year);
        let area_pop = buildings.population(year, &inside);

        let mut row = MetricRow::new(year);
        row.set("Total_Pop", total);
        row.set("Area_Pop", area_pop);
        row.set("Rate_Pop", rate(area_pop, total, 2));
        row.set("Area", MetricValue::Number(area_ha));
        row.set("Pop_Area_Density", density(area_pop, area_ha, 2));
        changes(
            &mut row,
            previous.as_ref(),
            &[
                ("Total_Pop", "Rate_Pop_Change"),
                ("Rate_Pop", "Rate_Pop_Change_Change"),
                ("Pop_Area_Density", "Rate_Density_Change"),
            ],
        );

        let city: Vec<i64> = FACILITY_TYPES.iter().map(|&t| counter.city(t, year)).collect();
        let in_area: Vec<i64> = FACILITY_TYPES.iter().map(|&t| counter.area(t, year)).collect();

        row.set("Total_Qty_Facility_00", city.iter().sum::<i64>());
        for (&t, &n) in FACILITY_TYPES.iter().zip(&city) {
            row.set(&column("Total_Qty_Facility", t), n);
        }
        row.set("Qty_Facility_00", in_area.iter().sum::<i64>());
        for (&t, &n) in FACILITY_TYPES.iter().zip(&in_area) {
            row.set(&column("Qty_Facility", t), n);
        }
        for (&t, share) in FACILITY_TYPES.iter().zip(shares(&in_area)) {
            row.set(&column("Rate_ALLFacility", t), share);
        }

        for t in std::iter::once(0).chain(FACILITY_TYPES) {
            let qty = column("Qty_Facility", t);
            let growth = column("Rate_Qty_Facility", t);
            let current = row.get(&qty).and_then(MetricValue::as_f64);
            let before = previous.as_ref().and_then(|p| p.get(&qty)).and_then(MetricValue::as_f64);
            let value = match (current, before) {
                (Some(cur), Some(prev)) => MetricValue::rate(cur - prev, prev, 2),
                _ => MetricValue::NotAvailable,
            };
            row.set(&growth, value);

            if t != 0 {
                let swing = match (
                    value.as_f64(),
                    previous.as_ref().and_then(|p| p.get(&growth)).and_then(MetricValue::as_f64),
                ) {
                    (Some(cur), Some(prev)) => MetricValue::rounded(cur - prev, 2),
                    _ => MetricValue::NotAvailable,
                };
                row.set(&column("Rate_Qty_Change", t), swing);
            }
        }

        table.push(row.clone());
        previous = Some(row);
    }
    table
}
