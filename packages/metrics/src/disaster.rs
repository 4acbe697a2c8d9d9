//! `IF103`: population exposed to hazards and within shelter reach.

use plateau_stats_ingest::area::{HAZARD_SOURCES, SHELTER_BUFFER_LAYER};
use plateau_stats_models::{Layer, MetricRow, MetricTable};
use plateau_stats_store::SpatialContainerStore;

use crate::context::{Buildings, Region, changes, rate, require};
use crate::{Calculator, MetricCalculator, MetricError};

const PLANNED: &str = HAZARD_SOURCES[0].layer;
const MAXIMUM: &str = HAZARD_SOURCES[1].layer;

/// Hazard layers other than river flooding, combined into `hazard01`:
/// landslides, floodplains, tsunamis and storm surges.
pub const OTHER_HAZARDS: [&str; 4] = [
    HAZARD_SOURCES[4].layer,
    HAZARD_SOURCES[5].layer,
    HAZARD_SOURCES[3].layer,
    HAZARD_SOURCES[2].layer,
];

/// Loaded hazard and shelter layers.
pub struct DisasterLayers {
    /// River flooding at the planned scale.
    pub planned: Layer,
    /// River flooding at the maximum assumed scale.
    pub maximum: Layer,
    /// Landslide, floodplain, tsunami and storm surge areas.
    pub others: Vec<Layer>,
    /// Shelter walking-distance buffers.
    pub shelter_buffers: Layer,
}

impl DisasterLayers {
    fn load(store: &SpatialContainerStore) -> Result<Self, MetricError> {
        Ok(Self {
            planned: require(store, PLANNED)?,
            maximum: require(store, MAXIMUM)?,
            others: OTHER_HAZARDS
                .iter()
                .map(|name| require(store, name))
                .collect::<Result<_, _>>()?,
            shelter_buffers: require(store, SHELTER_BUFFER_LAYER)?,
        })
    }
}

/// Computes `IF103`.
pub struct DisasterPrevention;

impl MetricCalculator for DisasterPrevention {
    fn calculator(&self) -> Calculator {
        Calculator::DisasterPrevention
    }

    fn calculate(&self, store: &SpatialContainerStore) -> Result<MetricTable, MetricError> {
        let buildings = Buildings::load(store)?;
        let layers = DisasterLayers::load(store)?;
        Ok(disaster_table(&buildings, &layers))
    }
}

/// Builds the table from loaded layers.
#[must_use]
pub fn disaster_table(buildings: &Buildings, layers: &DisasterLayers) -> MetricTable {
    let others: Vec<&Layer> = layers.others.iter().collect();
    let other = buildings.inside(&Region::union_of(&others));
    let planned = buildings.inside(&Region::from_layer(&layers.planned));
    let maximum = buildings.inside(&Region::from_layer(&layers.maximum));
    let safe: Vec<bool> = (0..buildings.len())
        .map(|i| !(other[i] || planned[i] || maximum[i]))
        .collect();
    let sheltered = buildings.inside(&Region::from_layer(&layers.shelter_buffers));

    let groups = [
        ("hazard01", &other),
        ("hazard02", &planned),
        ("hazard03", &maximum),
        ("hazard04", &safe),
    ];

    let mut table = Calculator::DisasterPrevention.table("city");
    let mut previous: Option<MetricRow> = None;

    for &year in &buildings.years {
        let total = buildings.total_population(year);
        let mut row = MetricRow::new(year);
        row.set("Total_Pop", total);

        let counts: Vec<i64> = groups
            .iter()
            .map(|(_, mask)| buildings.population(year, mask))
            .collect();
        for ((name, _), &pop) in groups.iter().zip(&counts) {
            row.set(&format!("{name}_Area_Pop"), pop);
        }
        for ((name, _), &pop) in groups.iter().zip(&counts) {
            row.set(&format!("Rate_{name}_Area_Pop"), rate(pop, total, 2));
        }
        for (name, _) in &groups {
            let share = format!("Rate_{name}_Area_Pop");
            let change = format!("Rate_{name}_Area_Pop_Change");
            changes(&mut row, previous.as_ref(), &[(share.as_str(), change.as_str())]);
        }

        let covered = buildings.population(year, &sheltered);
        row.set("Evacuation_Facility_Pop", covered);
        row.set("Rate_Evacuation_Facility_Pop", rate(covered, total, 2));
        changes(
            &mut row,
            previous.as_ref(),
            &[("Rate_Evacuation_Facility_Pop", "Rate_Evacuation_Facility_Pop_Change")],
        );

        table.push(row.clone());
        previous = Some(row);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{building_at, rect, scratch_dir, store_in};
    use plateau_stats_ingest::building;
    use plateau_stats_models::{ErrorKind, Feature, GeometryKind, MetricValue, Year};

    fn polygons(name: &str, rects: &[(f64, f64, f64, f64)]) -> Layer {
        let mut layer = Layer::new(name, GeometryKind::Polygon);
        for &(x0, y0, x1, y1) in rects {
            layer.push(Feature::new(rect(x0, y0, x1, y1)));
        }
        layer
    }

    fn fixture() -> (Buildings, DisasterLayers) {
        let mut layer = Layer::new(building::LAYER, GeometryKind::Polygon);
        for (x, pop_2015, pop_2020) in [(0.1, 10.0, 10.0), (0.3, 20.0, 30.0), (0.5, 30.0, 30.0), (0.7, 40.0, 30.0)] {
            layer.push(
                building_at(x, 0.5)
                    .with("2015_population", pop_2015)
                    .with("2020_population", pop_2020),
            );
        }
        let layers = DisasterLayers {
            // Planned flooding is nested in the maximum extent.
            planned: polygons(PLANNED, &[(0.0, 0.0, 0.2, 1.0)]),
            maximum: polygons(MAXIMUM, &[(0.0, 0.0, 0.4, 1.0)]),
            others: vec![
                polygons(OTHER_HAZARDS[0], &[(0.45, 0.0, 0.55, 1.0)]),
                polygons(OTHER_HAZARDS[1], &[]),
                polygons(OTHER_HAZARDS[2], &[(0.25, 0.0, 0.35, 1.0)]),
                polygons(OTHER_HAZARDS[3], &[]),
            ],
            shelter_buffers: polygons(SHELTER_BUFFER_LAYER, &[(0.6, 0.0, 1.0, 1.0)]),
        };
        (Buildings::from_layer(layer), layers)
    }

    #[test]
    fn populations_per_hazard_group() {
        let (buildings, layers) = fixture();
        let table = disaster_table(&buildings, &layers);
        let row = table.row(Year(2020)).unwrap();

        assert_eq!(row.get("Total_Pop"), Some(MetricValue::Int(100)));
        // Buildings at 0.3 (tsunami) and 0.5 (landslide).
        assert_eq!(row.get("hazard01_Area_Pop"), Some(MetricValue::Int(60)));
        assert_eq!(row.get("hazard02_Area_Pop"), Some(MetricValue::Int(10)));
        assert_eq!(row.get("hazard03_Area_Pop"), Some(MetricValue::Int(40)));
        assert_eq!(row.get("hazard04_Area_Pop"), Some(MetricValue::Int(30)));
        assert_eq!(row.get("Rate_hazard04_Area_Pop"), Some(MetricValue::Number(30.0)));
        assert_eq!(row.get("Evacuation_Facility_Pop"), Some(MetricValue::Int(30)));
    }

    #[test]
    fn changes_compare_with_previous_census() {
        let (buildings, layers) = fixture();
        let table = disaster_table(&buildings, &layers);

        let first = table.row(Year(2015)).unwrap();
        assert_eq!(
            first.get("Rate_Evacuation_Facility_Pop_Change"),
            Some(MetricValue::NotAvailable)
        );
        let last = table.row(Year(2020)).unwrap();
        // Shelter coverage fell from 40% to 30%.
        assert_eq!(
            last.get("Rate_Evacuation_Facility_Pop_Change"),
            Some(MetricValue::Number(-25.0))
        );
        // hazard01 rose from 50% to 60%.
        assert_eq!(last.get("Rate_hazard01_Area_Pop_Change"), Some(MetricValue::Number(20.0)));
    }

    #[test]
    fn missing_hazard_layer_is_missing_input() {
        let dir = scratch_dir("disaster_missing");
        let mut store = store_in(&dir);
        let (buildings, layers) = fixture();
        store.add_layer(&buildings.layer).unwrap();
        store.add_layer(&layers.planned).unwrap();

        let err = DisasterPrevention.calculate(&store).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingInput);
        assert!(err.to_string().contains(MAXIMUM));

        drop(store);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
