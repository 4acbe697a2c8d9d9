//! `IF104`: population within reach of railway stations and bus stops.

use plateau_stats_ingest::area::{
    BUS_BUFFER_LAYER, INDUCTION_LAYER, LAND_USE_LAYER, STATION_BUFFER_LAYER, URBAN_PLANNING_LAYER,
};
use plateau_stats_ingest::transportation::TRAFFIC_LAYER;
use plateau_stats_models::{Layer, MetricRow, MetricTable, Year};
use plateau_stats_store::SpatialContainerStore;

use crate::context::{Buildings, Region, changes, optional, rate, require};
use crate::{Calculator, MetricCalculator, MetricError};

/// Loaded coverage and area layers.
pub struct TransportLayers {
    /// `induction_areas`.
    pub induction: Layer,
    /// `urbun_plannings`; absent in some cities.
    pub urban_planning: Option<Layer>,
    /// `land_use_areas`; absent in some cities.
    pub land_use: Option<Layer>,
    /// Railway station coverage.
    pub station_buffers: Layer,
    /// Bus stop coverage.
    pub bus_buffers: Layer,
    /// Person trip survey zones.
    pub traffics: Layer,
}

impl TransportLayers {
    fn load(store: &SpatialContainerStore) -> Result<Self, MetricError> {
        Ok(Self {
            induction: require(store, INDUCTION_LAYER)?,
            urban_planning: optional(store, URBAN_PLANNING_LAYER)?,
            land_use: optional(store, LAND_USE_LAYER)?,
            station_buffers: require(store, STATION_BUFFER_LAYER)?,
            bus_buffers: require(store, BUS_BUFFER_LAYER)?,
            traffics: require(store, TRAFFIC_LAYER)?,
        })
    }
}

/// Computes `IF104`.
pub struct PublicTransport;

impl MetricCalculator for PublicTransport {
    fn calculator(&self) -> Calculator {
        Calculator::PublicTransport
    }

    fn calculate(&self, store: &SpatialContainerStore) -> Result<MetricTable, MetricError> {
        let buildings = Buildings::load(store)?;
        let layers = TransportLayers::load(store)?;
        Ok(public_transport_table(&buildings, &layers))
    }
}

/// Trip totals of the survey zones surveyed in `year`.
fn trips(traffics: &Layer, year: Year) -> (i64, i64, i64) {
    traffics
        .features
        .iter()
        .filter(|f| f.i64("survey_year") == Some(year.as_i64()))
        .fold((0, 0, 0), |(total, rail, bus), f| {
            (
                total + f.i64("total_trip_count").unwrap_or(0),
                rail + f.i64("rail_total_trip_count").unwrap_or(0),
                bus + f.i64("bus_total_trip_count").unwrap_or(0),
            )
        })
}

/// Builds the table from loaded layers.
#[must_use]
pub fn public_transport_table(buildings: &Buildings, layers: &TransportLayers) -> MetricTable {
    let all = vec![true; buildings.len()];
    let region_of = |layer: Option<&Layer>| layer.map_or_else(Region::empty, Region::from_layer);
    let areas = [
        all,
        buildings.inside(&region_of(layers.urban_planning.as_ref())),
        buildings.inside(&region_of(layers.land_use.as_ref())),
        buildings.inside(&Region::urban_function(&layers.induction)),
        buildings.inside(&Region::residential(&layers.induction)),
    ];
    let train = buildings.inside(&Region::from_layer(&layers.station_buffers));
    let bus = buildings.inside(&Region::from_layer(&layers.bus_buffers));

    let mut table = Calculator::PublicTransport.table("city");
    let mut previous: Option<MetricRow> = None;

    for &year in &buildings.years {
        let mut row = MetricRow::new(year);
        row.set("Total_Pop", buildings.total_population(year));

        let mut shares = Vec::new();
        for (n, area) in areas.iter().enumerate() {
            let within = |reach: &[bool]| -> Vec<bool> {
                area.iter().zip(reach).map(|(a, r)| *a && *r).collect()
            };
            let total = buildings.population(year, area);
            let train_pop = buildings.population(year, &within(&train));
            let bus_pop = buildings.population(year, &within(&bus));
            let mass_pop = train_pop + bus_pop;

            if n > 0 {
                row.set(&format!("Total_Area{n:02}_Pop"), total);
            }
            for (mode, pop) in [("Train", train_pop), ("Buss", bus_pop), ("MassTra", mass_pop)] {
                row.set(&format!("{mode}_Area{n:02}_Pop"), pop);
                shares.push((format!("Rate_{mode}_Area{n:02}_Pop"), rate(pop, total, 2)));
            }
        }
        for (column, value) in &shares {
            row.set(column, *value);
        }
        for (column, _) in &shares {
            let change = format!("{column}_Change");
            changes(&mut row, previous.as_ref(), &[(column.as_str(), change.as_str())]);
        }

        let (total, rail, bus_trips) = trips(&layers.traffics, year);
        row.set("Share_Public_Transportation", rate(rail + bus_trips, total, 2));
        row.set("Share_Public_Transportation_Train", rate(rail, total, 2));
        row.set("Share_Public_Transportation_Bus", rate(bus_trips, total, 2));

        table.push(row.clone());
        previous = Some(row);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use plateau_stats_models::MetricValue;
    use crate::testutil::{building_at, planning_area, rect};
    use plateau_stats_ingest::area::{RESIDENTIAL_INDUCTION, URBAN_FUNCTION_INDUCTION};
    use plateau_stats_ingest::building;
    use plateau_stats_models::{Feature, GeometryKind};

    fn polygon_layer(name: &str, rects: &[(f64, f64, f64, f64)]) -> Layer {
        let mut layer = Layer::new(name, GeometryKind::Polygon);
        for &(x0, y0, x1, y1) in rects {
            layer.push(Feature::new(rect(x0, y0, x1, y1)));
        }
        layer
    }

    fn fixture(land_use: bool) -> (Buildings, TransportLayers) {
        let mut layer = Layer::new(building::LAYER, GeometryKind::Polygon);
        for (x, pop) in [(0.1, 10.0), (0.3, 20.0), (0.5, 30.0), (0.7, 40.0)] {
            layer.push(building_at(x, 0.5).with("2020_population", pop));
        }
        let mut induction = Layer::new(INDUCTION_LAYER, GeometryKind::Polygon);
        induction.push(planning_area(rect(0.0, 0.0, 0.2, 1.0), URBAN_FUNCTION_INDUCTION));
        induction.push(planning_area(rect(0.0, 0.0, 0.4, 1.0), RESIDENTIAL_INDUCTION));

        let mut traffics = Layer::new(TRAFFIC_LAYER, GeometryKind::Polygon);
        traffics.push(
            Feature::new(rect(0.0, 0.0, 1.0, 1.0))
                .with("survey_year", "2020")
                .with("total_trip_count", 1000)
                .with("rail_total_trip_count", 150)
                .with("bus_total_trip_count", 50),
        );
        traffics.push(
            Feature::new(rect(0.0, 0.0, 1.0, 1.0))
                .with("survey_year", "2010")
                .with("total_trip_count", 5000),
        );

        let layers = TransportLayers {
            induction,
            urban_planning: Some(polygon_layer(URBAN_PLANNING_LAYER, &[(0.0, 0.0, 0.6, 1.0)])),
            land_use: land_use.then(|| polygon_layer(LAND_USE_LAYER, &[(0.0, 0.0, 1.0, 1.0)])),
            station_buffers: polygon_layer(STATION_BUFFER_LAYER, &[(0.0, 0.0, 0.2, 1.0)]),
            bus_buffers: polygon_layer(BUS_BUFFER_LAYER, &[(0.25, 0.0, 0.55, 1.0)]),
            traffics,
        };
        (Buildings::from_layer(layer), layers)
    }

    #[test]
    fn coverage_per_area() {
        let (buildings, layers) = fixture(true);
        let table = public_transport_table(&buildings, &layers);
        let row = table.row(Year(2020)).unwrap();

        assert_eq!(row.get("Train_Area00_Pop"), Some(MetricValue::Int(10)));
        assert_eq!(row.get("Buss_Area00_Pop"), Some(MetricValue::Int(50)));
        assert_eq!(row.get("MassTra_Area00_Pop"), Some(MetricValue::Int(60)));
        assert_eq!(row.get("Rate_MassTra_Area00_Pop"), Some(MetricValue::Number(60.0)));

        // Urban planning area holds the first three buildings.
        assert_eq!(row.get("Total_Area01_Pop"), Some(MetricValue::Int(60)));
        assert_eq!(row.get("Rate_Buss_Area01_Pop"), Some(MetricValue::Number(83.33)));

        // Residential induction area holds the first two.
        assert_eq!(row.get("Total_Area04_Pop"), Some(MetricValue::Int(30)));
        assert_eq!(row.get("Train_Area04_Pop"), Some(MetricValue::Int(10)));
        assert_eq!(row.get("Buss_Area04_Pop"), Some(MetricValue::Int(20)));
        assert_eq!(row.get("Rate_Train_Area03_Pop"), Some(MetricValue::Number(100.0)));
        assert_eq!(row.get("Rate_Train_Area03_Pop_Change"), Some(MetricValue::NotAvailable));
    }

    #[test]
    fn trip_shares_use_matching_survey_year() {
        let (buildings, layers) = fixture(true);
        let table = public_transport_table(&buildings, &layers);
        let row = table.row(Year(2020)).unwrap();
        assert_eq!(row.get("Share_Public_Transportation"), Some(MetricValue::Number(20.0)));
        assert_eq!(row.get("Share_Public_Transportation_Train"), Some(MetricValue::Number(15.0)));
        assert_eq!(row.get("Share_Public_Transportation_Bus"), Some(MetricValue::Number(5.0)));
    }

    #[test]
    fn missing_land_use_leaves_its_rates_unavailable() {
        let (buildings, layers) = fixture(false);
        let table = public_transport_table(&buildings, &layers);
        let row = table.row(Year(2020)).unwrap();
        assert_eq!(row.get("Total_Area02_Pop"), Some(MetricValue::Int(0)));
        assert!(matches!(
            row.get("Rate_Train_Area02_Pop"),
            Some(MetricValue::NotAvailable)
        ));
        assert!(!matches!(
            row.get("Rate_Train_Area01_Pop"),
            None | Some(MetricValue::NotAvailable)
        ));
    }
}
