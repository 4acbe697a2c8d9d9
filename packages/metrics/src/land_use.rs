//! `IF105`: vacant housing inside the residential induction area.

use std::collections::BTreeSet;

use plateau_stats_assign::population::RESIDENTIAL_USAGES;
use plateau_stats_assign::vacancy::flag_field;
use plateau_stats_ingest::area::INDUCTION_LAYER;
use plateau_stats_models::{MetricRow, MetricTable, MetricValue, Year};
use plateau_stats_store::SpatialContainerStore;

use crate::context::{Buildings, Region, changes, rate, require};
use crate::{Calculator, MetricCalculator, MetricError};

const SQUARE_METERS_PER_HECTARE: f64 = 10_000.0;

/// Computes `IF105`.
pub struct LandUse;

impl MetricCalculator for LandUse {
    fn calculator(&self) -> Calculator {
        Calculator::LandUse
    }

    fn calculate(&self, store: &SpatialContainerStore) -> Result<MetricTable, MetricError> {
        let buildings = Buildings::load(store)?;
        let induction = require(store, INDUCTION_LAYER)?;
        Ok(land_use_table(&buildings, &Region::residential(&induction)))
    }
}

/// Builds the table for the houses whose centroid lies in `residential`.
#[must_use]
pub fn land_use_table(buildings: &Buildings, residential: &Region) -> MetricTable {
    let inside = buildings.inside(residential);
    let houses: Vec<usize> = (0..buildings.len())
        .filter(|&i| inside[i])
        .filter(|&i| {
            let usage = buildings.feature(i).text("usage");
            RESIDENTIAL_USAGES.contains(&usage.as_str())
        })
        .collect();
    let floor_area = |i: usize| buildings.feature(i).f64("total_floor_area").unwrap_or(0.0);
    let total_floor: f64 = houses.iter().map(|&i| floor_area(i)).sum();
    let total_floor_ha = total_floor / SQUARE_METERS_PER_HECTARE;
    let induction_area = MetricValue::rounded(residential.hectares(), 1);

    let years: BTreeSet<Year> = buildings
        .years
        .iter()
        .copied()
        .chain(buildings.layer.years_with_suffix("is_vacancy"))
        .collect();

    let mut table = Calculator::LandUse.table("city");
    let mut previous: Option<MetricRow> = None;

    for year in years {
        let flag = flag_field(year);
        let vacant: Vec<usize> = houses
            .iter()
            .copied()
            .filter(|&i| buildings.feature(i).i64(&flag) == Some(1))
            .collect();
        let vacant_floor_ha =
            vacant.iter().map(|&i| floor_area(i)).sum::<f64>() / SQUARE_METERS_PER_HECTARE;

        let total = i64::try_from(houses.len()).unwrap_or(i64::MAX);
        let vacant_count = i64::try_from(vacant.len()).unwrap_or(i64::MAX);

        let mut row = MetricRow::new(year);
        row.set("Total_Number", total);
        row.set("Vacant_Number", vacant_count);
        row.set("Vacant_Rate", rate(vacant_count, total, 2));
        changes(&mut row, previous.as_ref(), &[("Vacant_Rate", "Vacant_Rate_Change")]);
        row.set("Total_FloorArea", MetricValue::rounded(total_floor_ha, 2));
        row.set("Vacant_FloorArea", MetricValue::rounded(vacant_floor_ha, 2));
        row.set(
            "Vacant_Floor_Rate",
            MetricValue::rate(vacant_floor_ha, total_floor_ha, 2),
        );
        changes(
            &mut row,
            previous.as_ref(),
            &[("Vacant_Floor_Rate", "Vacant_Rate_Floor_Change")],
        );
        row.set("Induction_Area", induction_area);

        table.push(row.clone());
        previous = Some(row);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{building_at, planning_area, rect};
    use plateau_stats_ingest::area::RESIDENTIAL_INDUCTION;
    use plateau_stats_ingest::building;
    use plateau_stats_models::{GeometryKind, Layer};

    fn fixture() -> (Buildings, Region) {
        let mut layer = Layer::new(building::LAYER, GeometryKind::Polygon)
            .with_fields(&["2015_is_vacancy", "2020_is_vacancy"]);
        let houses = [
            (0.1, "住宅", 1000.0, 1, 0),
            (0.2, "共同住宅", 3000.0, 1, 1),
            (0.3, "住宅", 2000.0, 0, 0),
            (0.4, "住宅", 4000.0, 0, 0),
            // Not residential.
            (0.2, "商業施設", 5000.0, 1, 1),
        ];
        for (x, usage, floor, v2015, v2020) in houses {
            layer.push(
                building_at(x, 0.5)
                    .with("usage", usage)
                    .with("total_floor_area", floor)
                    .with("2015_is_vacancy", v2015)
                    .with("2020_is_vacancy", v2020),
            );
        }
        // Outside the induction area.
        layer.push(
            building_at(0.9, 0.5)
                .with("usage", "住宅")
                .with("total_floor_area", 500.0)
                .with("2020_is_vacancy", 1),
        );

        let mut induction = Layer::new(INDUCTION_LAYER, GeometryKind::Polygon);
        induction.push(planning_area(rect(0.0, 0.0, 0.5, 1.0), RESIDENTIAL_INDUCTION));
        (Buildings::from_layer(layer), Region::residential(&induction))
    }

    #[test]
    fn counts_residential_houses_in_the_area() {
        let (buildings, region) = fixture();
        let table = land_use_table(&buildings, &region);

        let first = table.row(Year(2015)).unwrap();
        assert_eq!(first.get("Total_Number"), Some(MetricValue::Int(4)));
        assert_eq!(first.get("Vacant_Number"), Some(MetricValue::Int(2)));
        assert_eq!(first.get("Vacant_Rate"), Some(MetricValue::Number(50.0)));
        assert_eq!(first.get("Total_FloorArea"), Some(MetricValue::Number(1.0)));
        assert_eq!(first.get("Vacant_FloorArea"), Some(MetricValue::Number(0.4)));
        assert_eq!(first.get("Vacant_Floor_Rate"), Some(MetricValue::Number(40.0)));
        assert_eq!(first.get("Vacant_Rate_Change"), Some(MetricValue::NotAvailable));
    }

    #[test]
    fn changes_follow_the_vacancy_survey_years() {
        let (buildings, region) = fixture();
        let table = land_use_table(&buildings, &region);

        let last = table.row(Year(2020)).unwrap();
        assert_eq!(last.get("Vacant_Number"), Some(MetricValue::Int(1)));
        assert_eq!(last.get("Vacant_Rate"), Some(MetricValue::Number(25.0)));
        assert_eq!(last.get("Vacant_Rate_Change"), Some(MetricValue::Number(-50.0)));
        assert_eq!(last.get("Vacant_Rate_Floor_Change"), Some(MetricValue::Number(-25.0)));
    }

    #[test]
    fn empty_area_leaves_rates_unavailable() {
        let (buildings, _) = fixture();
        let table = land_use_table(&buildings, &Region::empty());
        let row = table.row(Year(2020)).unwrap();
        assert_eq!(row.get("Total_Number"), Some(MetricValue::Int(0)));
        assert_eq!(row.get("Vacant_Rate"), Some(MetricValue::NotAvailable));
        assert_eq!(row.get("Induction_Area"), Some(MetricValue::Number(0.0)));
    }
}
