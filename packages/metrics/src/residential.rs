//! `IF101`: population inside and outside the residential induction area.

use plateau_stats_ingest::{area, population};
use plateau_stats_messages::{Message, tr};
use plateau_stats_models::metric::round;
use plateau_stats_models::{Layer, MetricRow, MetricTable, MetricValue, Year};
use plateau_stats_store::SpatialContainerStore;

use crate::context::{Buildings, Region, changes, density, rate, require, whole};
use crate::{Calculator, MetricCalculator, MetricError};

/// Age buckets as `(column suffix, building field suffix)`.
pub const AGE_BUCKETS: [(&str, &str); 6] = [
    ("Age0-14s", "age_0_14"),
    ("Age15-64s", "age_15_64"),
    ("Age65AndOver", "age_65_"),
    ("Age75AndOver", "age_75_total"),
    ("Age85AndOver", "age_85_total"),
    ("Age95AndOver", "age_95_total"),
];

/// The comparative future year and its population target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    /// Future year the target refers to.
    pub year: Year,
    /// Target population inside the residential induction area.
    pub population: i64,
}

/// The first row of `population_target_settings`, if any.
#[must_use]
pub fn first_target(settings: &Layer) -> Option<Target> {
    let row = settings.features.first()?;
    let year = u16::try_from(row.i64("comparative_year")?).ok()?;
    Some(Target {
        year: Year(year),
        population: row.i64("target_population")?,
    })
}

/// Computes `IF101`.
pub struct ResidentialInduction;

impl MetricCalculator for ResidentialInduction {
    fn calculator(&self) -> Calculator {
        Calculator::ResidentialInduction
    }

    fn calculate(&self, store: &SpatialContainerStore) -> Result<MetricTable, MetricError> {
        let buildings = Buildings::load(store)?;
        let induction = require(store, area::INDUCTION_LAYER)?;
        let settings = require(store, population::TARGET_LAYER)?;

        let target = first_target(&settings);
        match target {
            Some(t) => log::info!("{}", tr(Message::TargetPopulation, &[&t.year, &t.population])),
            None => log::warn!("{}", tr(Message::TargetPopulationMissing, &[])),
        }

        Ok(residential_table(&buildings, &induction, target))
    }
}

/// Builds the table from loaded layers.
#[must_use]
pub fn residential_table(
    buildings: &Buildings,
    induction: &Layer,
    target: Option<Target>,
) -> MetricTable {
    let inside_region = Region::residential(induction);
    let whole_plan = Region::of_type(induction, area::WHOLE_PLAN_AREA);
    let inside = buildings.inside(&inside_region);

    let area_ha = round(inside_region.hectares(), 1);
    let outside_ha = round(
        (whole_plan.hectares() - inside_region.hectares()).max(0.0),
        1,
    );

    let mut table = Calculator::ResidentialInduction.table("residential induction area");
    let latest = buildings.years.last().copied();
    let mut previous: Option<MetricRow> = None;

    for &year in &buildings.years {
        let total = buildings.total_population(year);
        let area_pop = buildings.population(year, &inside);
        let outside_pop = total - area_pop;

        let mut row = MetricRow::new(year);
        row.set("Total_Pop", total);
        row.set("Area_Pop", area_pop);
        row.set("Outside_Area_Pop", outside_pop);
        row.set("Rate_Pop", rate(area_pop, total, 2));
        row.set("Outside_Rate_Pop", rate(outside_pop, total, 2));
        row.set("Area", MetricValue::Number(area_ha));
        row.set("Outside_Area", MetricValue::Number(outside_ha));
        row.set("Pop_Area_Density", density(area_pop, area_ha, 2));
        row.set("Pop_Outside_Area_Density", density(outside_pop, outside_ha, 2));

        for (key, suffix) in AGE_BUCKETS {
            let pop = whole(buildings.sum(&format!("{year}_{suffix}"), &inside));
            row.set(&format!("Pop_Area_{key}"), pop);
            row.set(&format!("Rate_Pop_Area_{key}"), rate(pop, total, 2));
            row.set(&format!("Rate_Pop_Area_Density_{key}"), density(pop, area_ha, 1));
        }

        changes(
            &mut row,
            previous.as_ref(),
            &[
                ("Total_Pop", "Rate_Pop_Change"),
                ("Rate_Pop", "Rate_Pop_Change_Change"),
                ("Pop_Area_Density", "Rate_Density_Change"),
                ("Pop_Outside_Area_Density", "Rate_Outside_Density_Change"),
            ],
        );
        for (key, _) in AGE_BUCKETS {
            let share = format!("Rate_Pop_Area_{key}");
            let share_change = format!("Rate_Pop_Area_Change_{key}");
            let per_ha = format!("Rate_Pop_Area_Density_{key}");
            let per_ha_change = format!("Rate_Pop_Area_Change_Density_{key}");
            changes(
                &mut row,
                previous.as_ref(),
                &[
                    (share.as_str(), share_change.as_str()),
                    (per_ha.as_str(), per_ha_change.as_str()),
                ],
            );
        }

        let outlook = (Some(year) == latest)
            .then_some(target)
            .flatten()
            .map(|t| Outlook::new(buildings, &inside, area_pop, t));
        outlook.unwrap_or_default().write(&mut row);

        table.push(row.clone());
        previous = Some(row);
    }
    table
}

/// Target comparison columns, filled only for the latest census year.
#[derive(Debug, Clone, Copy)]
struct Outlook {
    area_pop_difference: MetricValue,
    outside_future_pop: MetricValue,
    target_difference: MetricValue,
    appropriateness_sp: MetricValue,
    appropriateness_sr: MetricValue,
}

impl Default for Outlook {
    fn default() -> Self {
        Self {
            area_pop_difference: MetricValue::NotAvailable,
            outside_future_pop: MetricValue::NotAvailable,
            target_difference: MetricValue::NotAvailable,
            appropriateness_sp: MetricValue::NotAvailable,
            appropriateness_sr: MetricValue::NotAvailable,
        }
    }
}

impl Outlook {
    fn new(buildings: &Buildings, inside: &[bool], area_pop: i64, target: Target) -> Self {
        let field = format!("future_{}_PT0", target.year);
        let future_area = whole(buildings.sum(&field, inside));
        let future_total = whole(buildings.total(&field));
        let difference = area_pop - future_area;
        let outside_future = future_total - future_area;
        // Gap between the projected and the targeted population inside the area.
        let gap = future_area - target.population;

        Self {
            area_pop_difference: difference.into(),
            outside_future_pop: outside_future.into(),
            target_difference: if target.population > 0 {
                rate(gap, target.population, 2)
            } else {
                MetricValue::NotAvailable
            },
            appropriateness_sp: rate(gap, difference, 2),
            appropriateness_sr: if outside_future > 0 {
                rate(gap, outside_future, 2)
            } else {
                MetricValue::NotAvailable
            },
        }
    }

    fn write(self, row: &mut MetricRow) {
        row.set("Area_Pop_Difference", self.area_pop_difference);
        row.set("Outside_Area_Future_Pop", self.outside_future_pop);
        row.set("Rate_Target_Pop_Difference", self.target_difference);
        row.set("Rate_Area_Appropriateness_Sp", self.appropriateness_sp);
        row.set("Rate_Area_Appropriateness_Sr", self.appropriateness_sr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{building_at, planning_area, rect, scratch_dir, store_in};
    use plateau_stats_ingest::building;
    use plateau_stats_models::{ErrorKind, Feature, GeometryKind};

    fn fixture() -> (Buildings, Layer) {
        let mut layer = Layer::new(building::LAYER, GeometryKind::Polygon);
        layer.push(
            building_at(0.2, 0.2)
                .with("2015_population", 60.0)
                .with("2020_population", 80.0)
                .with("2020_age_65_", 20.0)
                .with("future_2040_PT0", 70.0),
        );
        layer.push(
            building_at(0.8, 0.8)
                .with("2015_population", 40.0)
                .with("2020_population", 20.0)
                .with("2020_age_65_", 5.0)
                .with("future_2040_PT0", 30.0),
        );
        let mut induction = Layer::new(area::INDUCTION_LAYER, GeometryKind::Polygon);
        induction.push(planning_area(rect(0.0, 0.0, 0.5, 0.5), area::RESIDENTIAL_INDUCTION));
        induction.push(planning_area(rect(0.0, 0.0, 1.0, 1.0), area::WHOLE_PLAN_AREA));
        (Buildings::from_layer(layer), induction)
    }

    #[test]
    fn shares_densities_and_changes() {
        let (buildings, induction) = fixture();
        let table = residential_table(&buildings, &induction, None);
        assert_eq!(table.rows.len(), 2);

        let first = table.row(Year(2015)).unwrap();
        assert_eq!(first.get("Area_Pop"), Some(MetricValue::Int(60)));
        assert_eq!(first.get("Rate_Pop"), Some(MetricValue::Number(60.0)));
        assert_eq!(first.get("Rate_Pop_Change"), Some(MetricValue::NotAvailable));

        let last = table.row(Year(2020)).unwrap();
        assert_eq!(last.get("Total_Pop"), Some(MetricValue::Int(100)));
        assert_eq!(last.get("Outside_Area_Pop"), Some(MetricValue::Int(20)));
        assert_eq!(last.get("Rate_Pop"), Some(MetricValue::Number(80.0)));
        assert_eq!(last.get("Rate_Pop_Change"), Some(MetricValue::Number(0.0)));
        // 60% -> 80% of the city.
        assert_eq!(last.get("Rate_Pop_Change_Change"), Some(MetricValue::Number(33.3)));
        assert_eq!(last.get("Pop_Area_Age65AndOver"), Some(MetricValue::Int(20)));
        assert_eq!(last.get("Rate_Pop_Area_Age65AndOver"), Some(MetricValue::Number(20.0)));

        let MetricValue::Number(area) = last.get("Area").unwrap() else {
            panic!("area should be numeric");
        };
        let MetricValue::Number(outside) = last.get("Outside_Area").unwrap() else {
            panic!("outside area should be numeric");
        };
        assert!(area > 0.0);
        // The whole plan area is four times the residential square.
        assert!((outside / area - 3.0).abs() < 0.01);
        assert_eq!(last.get("Area_Pop_Difference"), Some(MetricValue::NotAvailable));
    }

    #[test]
    fn latest_year_is_compared_with_target() {
        let (buildings, induction) = fixture();
        let target = Target {
            year: Year(2040),
            population: 50,
        };
        let table = residential_table(&buildings, &induction, Some(target));

        let first = table.row(Year(2015)).unwrap();
        assert_eq!(first.get("Rate_Target_Pop_Difference"), Some(MetricValue::NotAvailable));

        let last = table.row(Year(2020)).unwrap();
        // 80 now, 70 projected, 50 targeted, 30 projected outside.
        assert_eq!(last.get("Area_Pop_Difference"), Some(MetricValue::Int(10)));
        assert_eq!(last.get("Outside_Area_Future_Pop"), Some(MetricValue::Int(30)));
        assert_eq!(last.get("Rate_Target_Pop_Difference"), Some(MetricValue::Number(40.0)));
        assert_eq!(last.get("Rate_Area_Appropriateness_Sp"), Some(MetricValue::Number(200.0)));
        assert_eq!(last.get("Rate_Area_Appropriateness_Sr"), Some(MetricValue::Number(66.67)));
    }

    #[test]
    fn target_comes_from_first_settings_row() {
        let mut settings = Layer::new(population::TARGET_LAYER, GeometryKind::None);
        assert_eq!(first_target(&settings), None);
        settings.push(
            Feature::default()
                .with("comparative_year", 2040)
                .with("target_population", 1200),
        );
        settings.push(
            Feature::default()
                .with("comparative_year", 2050)
                .with("target_population", 900),
        );
        assert_eq!(
            first_target(&settings),
            Some(Target {
                year: Year(2040),
                population: 1200
            })
        );
    }

    #[test]
    fn missing_target_layer_is_missing_input() {
        let dir = scratch_dir("residential_missing");
        let mut store = store_in(&dir);
        let (buildings, induction) = fixture();
        store.add_layer(&buildings.layer).unwrap();
        store.add_layer(&induction).unwrap();

        let err = ResidentialInduction.calculate(&store).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingInput);
        assert_eq!(err.to_string(), "The population_target_settings layer was not found.");

        drop(store);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
