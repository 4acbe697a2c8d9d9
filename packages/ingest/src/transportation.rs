//! Road, railway, bus and traffic flow layers.
//!
//! The five datasets are independent: one that is missing or unreadable is
//! logged and recorded, and the others are still written. Only container
//! write failures abort the domain.

use std::collections::BTreeSet;

use geo::{Centroid, Geometry};
use plateau_stats_messages::{Message, label, tr};
use plateau_stats_models::{AttrValue, Feature, GeometryKind, Layer};
use plateau_stats_source::discovery::{find_dirs_containing, find_shapefiles};
use plateau_stats_source::gtfs::read_gtfs;
use plateau_stats_store::SpatialContainerStore;

use crate::common::{
    FieldMap, cannot_load, load_shapefiles, map_feature, output_fields, push_checked, recover,
    retain_intersecting, source_fields, year_from_path, zone_index,
};
use crate::{Domain, IngestContext, IngestError, IngestReport, Ingestor};

/// Road network layer.
pub const ROAD_LAYER: &str = "road_networks";
/// Railway station layer.
pub const STATION_LAYER: &str = "railway_stations";
/// Railway line layer.
pub const RAILWAY_LAYER: &str = "railway_networks";
/// Bus stop layer.
pub const BUS_STOP_LAYER: &str = "bus_stops";
/// Bus segment layer.
pub const BUS_LAYER: &str = "bus_networks";
/// Traffic flow layer.
pub const TRAFFIC_LAYER: &str = "traffics";

const ROAD_FOLDER: &str = "道路ネットワーク";
const STATION_FOLDER: &str = "鉄道駅位置";
const RAILWAY_FOLDER: &str = "鉄道ネットワーク";
const BUS_FOLDER: &str = "バスネットワーク";
const TRAFFIC_FOLDER: &str = "交通流動";

const ROAD_FIELDS: &[&str] = &[
    "osm_id", "code", "fclass", "name", "ref", "oneway", "maxspeed", "layer", "bridge", "tunnel",
];

const STATION_FIELDS: FieldMap = &[
    ("N02_001", "type"),
    ("N02_002", "business_type"),
    ("N02_003", "railway_name"),
    ("N02_004", "company_name"),
    ("N02_005", "name"),
    ("N02_005c", "code"),
    ("N02_005g", "group_code"),
];

const RAILWAY_FIELDS: FieldMap = &[
    ("N02_001", "type"),
    ("N02_002", "business_type"),
    ("N02_003", "name"),
    ("N02_004", "company_name"),
];

/// Traffic flow survey columns.
pub const TRAFFIC_FIELDS: FieldMap = &[
    ("S05a_001", "urban_area"),
    ("S05a_002", "survey_year"),
    ("S05a_003", "occurrence_concentration"),
    ("S05a_004", "zone_code"),
    ("S05a_005", "rail_commute_trip_count"),
    ("S05a_006", "rail_school_trip_count"),
    ("S05a_007", "rail_leisure_trip_count"),
    ("S05a_008", "rail_business_trip_count"),
    ("S05a_009", "rail_home_trip_count"),
    ("S05a_010", "rail_total_trip_count"),
    ("S05a_011", "bus_commute_trip_count"),
    ("S05a_012", "bus_school_trip_count"),
    ("S05a_013", "bus_leisure_trip_count"),
    ("S05a_014", "bus_business_trip_count"),
    ("S05a_015", "bus_home_trip_count"),
    ("S05a_016", "bus_total_trip_count"),
    ("S05a_017", "car_commute_trip_count"),
    ("S05a_018", "car_school_trip_count"),
    ("S05a_019", "car_leisure_trip_count"),
    ("S05a_020", "car_business_trip_count"),
    ("S05a_021", "car_home_trip_count"),
    ("S05a_022", "car_total_trip_count"),
    ("S05a_023", "motorcycle_commute_trip_count"),
    ("S05a_024", "motorcycle_school_trip_count"),
    ("S05a_025", "motorcycle_leisure_trip_count"),
    ("S05a_026", "motorcycle_business_trip_count"),
    ("S05a_027", "motorcycle_home_trip_count"),
    ("S05a_028", "motorcycle_total_trip_count"),
    ("S05a_029", "walking_commute_trip_count"),
    ("S05a_030", "walking_school_trip_count"),
    ("S05a_031", "walking_leisure_trip_count"),
    ("S05a_032", "walking_business_trip_count"),
    ("S05a_033", "walking_home_trip_count"),
    ("S05a_034", "walking_total_trip_count"),
    ("S05a_035", "total_trip_count"),
];

/// Builds the transportation layers.
pub struct TransportationIngestor;

impl Ingestor for TransportationIngestor {
    fn domain(&self) -> Domain {
        Domain::Transportation
    }

    fn ingest(
        &self,
        ctx: &IngestContext,
        store: &mut SpatialContainerStore,
    ) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::default();

        let parts: [(&str, Part); 5] = [
            ("road network", road_networks),
            ("railway station", railway_stations),
            ("railway network", railway_networks),
            ("bus network", bus_networks),
            ("traffic", traffics),
        ];
        for (name, part) in parts {
            let outcome = part(ctx, store, &mut report);
            recover(&mut report, name, outcome)?;
        }
        Ok(report)
    }
}

type Part = fn(&IngestContext, &mut SpatialContainerStore, &mut IngestReport) -> Result<(), IngestError>;

fn not_found(name: &str) -> IngestError {
    IngestError::ShapefileNotFound { label: label(name) }
}

fn road_networks(
    ctx: &IngestContext,
    store: &mut SpatialContainerStore,
    report: &mut IngestReport,
) -> Result<(), IngestError> {
    let folder = ctx.path(ROAD_FOLDER);
    if find_shapefiles(&folder).is_empty() {
        return Err(not_found("road network"));
    }
    let zones = zone_index(store)?;

    let mut layer = Layer::new(ROAD_LAYER, GeometryKind::LineString).with_fields(ROAD_FIELDS);
    for data in load_shapefiles(&folder, report) {
        let name = data.display_name();
        if !data.has_fields(ROAD_FIELDS) {
            cannot_load(report, &name, "road network");
            continue;
        }
        for (index, source) in data.features.iter().enumerate() {
            let mut feature = Feature::new(source.geometry.clone());
            for field in ROAD_FIELDS {
                feature.set(field, source.get(field).clone());
            }
            push_checked(&mut layer, feature, &name, index, report);
        }
    }
    retain_intersecting(&mut layer, &zones);
    report.write(store, &layer)
}

fn railway_stations(
    ctx: &IngestContext,
    store: &mut SpatialContainerStore,
    report: &mut IngestReport,
) -> Result<(), IngestError> {
    let folder = ctx.path(STATION_FOLDER);
    if find_shapefiles(&folder).is_empty() {
        return Err(not_found("railway station"));
    }
    // Code and group code only exist in newer releases.
    let mut required = source_fields(STATION_FIELDS);
    required.truncate(5);

    let mut fields = output_fields(STATION_FIELDS);
    fields.push("year");
    let mut layer = Layer::new(STATION_LAYER, GeometryKind::Point).with_fields(&fields);
    let mut loaded = 0;
    for data in load_shapefiles(&folder, report) {
        let name = data.display_name();
        if !data.has_fields(&required) {
            cannot_load(report, &name, "railway station");
            continue;
        }
        loaded += 1;
        let year = year_from_path(&folder, &data.path).map(|y| y.as_i64());
        for (index, source) in data.features.iter().enumerate() {
            let mut feature = map_feature(source, STATION_FIELDS);
            feature.set("year", year);
            // Station records are platform lines; keep one point per station.
            feature.geometry = source
                .geometry
                .as_ref()
                .and_then(Centroid::centroid)
                .map(Geometry::Point);
            push_checked(&mut layer, feature, &name, index, report);
        }
    }
    if loaded == 0 {
        return Err(IngestError::NoValidShapefile {
            label: label("railway station"),
        });
    }
    report.write(store, &layer)
}

fn railway_networks(
    ctx: &IngestContext,
    store: &mut SpatialContainerStore,
    report: &mut IngestReport,
) -> Result<(), IngestError> {
    let folder = ctx.path(RAILWAY_FOLDER);
    if find_shapefiles(&folder).is_empty() {
        return Err(not_found("railway network"));
    }
    let expected: BTreeSet<&str> = source_fields(RAILWAY_FIELDS).into_iter().collect();

    let mut fields = output_fields(RAILWAY_FIELDS);
    fields.push("year");
    let mut layer = Layer::new(RAILWAY_LAYER, GeometryKind::LineString).with_fields(&fields);
    let mut loaded = 0;
    for data in load_shapefiles(&folder, report) {
        let name = data.display_name();
        let actual: BTreeSet<&str> = data.fields.iter().map(String::as_str).collect();
        // Station files carry the same prefix plus N02_005; only exact line files qualify.
        if actual != expected {
            cannot_load(report, &name, "railway network");
            continue;
        }
        loaded += 1;
        let year = year_from_path(&folder, &data.path).map(|y| y.as_i64());
        for (index, source) in data.features.iter().enumerate() {
            let feature = map_feature(source, RAILWAY_FIELDS).with("year", year);
            push_checked(&mut layer, feature, &name, index, report);
        }
    }
    if loaded == 0 {
        return Err(IngestError::NoValidShapefile {
            label: label("railway network"),
        });
    }
    report.write(store, &layer)
}

#[allow(clippy::cast_possible_wrap)]
fn bus_networks(
    ctx: &IngestContext,
    store: &mut SpatialContainerStore,
    report: &mut IngestReport,
) -> Result<(), IngestError> {
    let feeds = find_dirs_containing(&ctx.path(BUS_FOLDER), "stops.txt");
    if feeds.is_empty() {
        return Err(IngestError::FileNotFound {
            path: ctx.path(BUS_FOLDER).join("stops.txt"),
        });
    }

    let mut stops = Layer::new(BUS_STOP_LAYER, GeometryKind::Point).with_fields(&[
        "stop_id",
        "stop_name",
        "stop_lat",
        "stop_lon",
        "stop_times_count",
    ]);
    let mut lines = Layer::new(BUS_LAYER, GeometryKind::LineString).with_fields(&[
        "agency_id",
        "route_id",
        "from_stop_id",
        "to_stop_id",
    ]);

    for dir in feeds {
        log::info!("{}", tr(Message::ProcessingGtfs, &[&dir.display()]));
        let feed = match read_gtfs(&dir) {
            Ok(feed) => feed,
            Err(e) => {
                log::warn!("{}: {e}", dir.display());
                report.skip(dir.display(), &e, e.kind());
                continue;
            }
        };
        for stop in feed.stops {
            stops.push(
                Feature::new(Geometry::Point(stop.location))
                    .with("stop_id", stop.stop_id)
                    .with("stop_name", stop.stop_name)
                    .with("stop_lat", stop.location.y())
                    .with("stop_lon", stop.location.x())
                    .with("stop_times_count", stop.stop_times_count as i64),
            );
        }
        for segment in feed.segments {
            let agency = (!segment.agency_id.is_empty()).then_some(segment.agency_id);
            lines.push(
                Feature::new(Geometry::LineString(segment.line))
                    .with("agency_id", agency)
                    .with("route_id", segment.route_id)
                    .with("from_stop_id", segment.from_stop_id)
                    .with("to_stop_id", segment.to_stop_id),
            );
        }
    }

    report.write(store, &stops)?;
    report.write(store, &lines)
}

fn traffics(
    ctx: &IngestContext,
    store: &mut SpatialContainerStore,
    report: &mut IngestReport,
) -> Result<(), IngestError> {
    let folder = ctx.path(TRAFFIC_FOLDER);
    if find_shapefiles(&folder).is_empty() {
        return Err(not_found("traffic"));
    }

    let mut layer =
        Layer::new(TRAFFIC_LAYER, GeometryKind::Polygon).with_fields(&output_fields(TRAFFIC_FIELDS));
    for data in load_shapefiles(&folder, report) {
        let name = data.display_name();
        for (index, source) in data.features.iter().enumerate() {
            let mut feature = map_feature(source, TRAFFIC_FIELDS);
            for (_, field) in TRAFFIC_FIELDS.iter().filter(|(_, f)| f.ends_with("_count")) {
                let count = feature.i64(field);
                feature.set(field, AttrValue::from(count));
            }
            for field in ["urban_area", "survey_year", "occurrence_concentration", "zone_code"] {
                let text = feature.get(field).clone();
                if !text.is_null() {
                    feature.set(field, text.to_string());
                }
            }
            push_checked(&mut layer, feature, &name, index, report);
        }
    }
    report.write(store, &layer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{rect, scratch_dir, seed_zones, shapefile, store_in};
    use approx::assert_relative_eq;
    use plateau_stats_models::ErrorKind;
    use geo::{LineString, line_string};
    use plateau_stats_source::shp::ShapeType;
    use plateau_stats_source::write::DbfField;

    fn road_fields() -> Vec<DbfField> {
        ROAD_FIELDS.iter().map(|f| DbfField::text(f, 10)).collect()
    }

    fn road_row(id: &str) -> Vec<AttrValue> {
        let mut row: Vec<AttrValue> = vec![id.into()];
        row.extend((1..ROAD_FIELDS.len()).map(|_| AttrValue::from("x")));
        row
    }

    #[test]
    fn roads_outside_the_zones_are_dropped_and_missing_parts_recorded() {
        let dir = scratch_dir("transport_roads");
        let input = dir.join("input");
        shapefile(
            &input,
            &format!("{ROAD_FOLDER}/roads.shp"),
            ShapeType::PolyLine,
            vec![
                Geometry::LineString(line_string![(x: 0.2, y: 0.2), (x: 0.8, y: 0.8)]),
                Geometry::LineString(line_string![(x: 5.0, y: 5.0), (x: 6.0, y: 6.0)]),
            ],
            &road_fields(),
            &[road_row("1"), road_row("2")],
        );
        let mut store = store_in(&dir);
        seed_zones(&mut store);

        let report = TransportationIngestor
            .ingest(&IngestContext::new(&input), &mut store)
            .unwrap();

        let roads = store.load_layer(ROAD_LAYER).unwrap();
        assert_eq!(roads.len(), 1);
        assert_eq!(roads.features[0].text("osm_id"), "1");
        assert_eq!(report.layers, vec![ROAD_LAYER.to_string()]);
        // Stations, railways, bus and traffic are all absent.
        assert_eq!(report.skipped.len(), 4);
        assert!(!store.contains(STATION_LAYER).unwrap());

        drop(store);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn station_lines_become_centroids_and_railways_need_exact_fields() {
        let dir = scratch_dir("transport_rail");
        let input = dir.join("input");
        let station_fields: Vec<DbfField> = ["N02_001", "N02_002", "N02_003", "N02_004", "N02_005"]
            .iter()
            .map(|f| DbfField::text(f, 20))
            .collect();
        let station_line: LineString<f64> = line_string![(x: 0.0, y: 0.0), (x: 0.2, y: 0.0)];
        shapefile(
            &input,
            &format!("{STATION_FOLDER}/2022年/N02-22_Station.shp"),
            ShapeType::PolyLine,
            vec![Geometry::LineString(station_line.clone())],
            &station_fields,
            &[vec![
                "11".into(),
                "2".into(),
                "Main Line".into(),
                "Rail Co".into(),
                "Central".into(),
            ]],
        );
        // A station file does not qualify as a railway network.
        shapefile(
            &input,
            &format!("{RAILWAY_FOLDER}/N02-22_Station.shp"),
            ShapeType::PolyLine,
            vec![Geometry::LineString(station_line.clone())],
            &station_fields,
            &[vec!["11".into(), "2".into(), "a".into(), "b".into(), "c".into()]],
        );
        shapefile(
            &input,
            &format!("{RAILWAY_FOLDER}/N02-22_RailroadSection.shp"),
            ShapeType::PolyLine,
            vec![Geometry::LineString(station_line)],
            &station_fields[..4],
            &[vec!["11".into(), "2".into(), "Main Line".into(), "Rail Co".into()]],
        );
        let mut store = store_in(&dir);
        seed_zones(&mut store);

        let report = TransportationIngestor
            .ingest(&IngestContext::new(&input), &mut store)
            .unwrap();

        let stations = store.load_layer(STATION_LAYER).unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations.features[0].text("name"), "Central");
        assert_eq!(stations.features[0].i64("year"), Some(2022));
        let Some(Geometry::Point(centroid)) = &stations.features[0].geometry else {
            panic!("station is not a point");
        };
        assert_relative_eq!(centroid.x(), 0.1, epsilon = 1e-9);
        assert_relative_eq!(centroid.y(), 0.0, epsilon = 1e-9);

        let railways = store.load_layer(RAILWAY_LAYER).unwrap();
        assert_eq!(railways.len(), 1);
        assert_eq!(railways.features[0].text("name"), "Main Line");
        assert!(
            report
                .skipped
                .iter()
                .any(|s| s.item == "N02-22_Station.shp" && s.kind == ErrorKind::Format)
        );

        drop(store);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn gtfs_feeds_become_stops_and_segments() {
        let dir = scratch_dir("transport_bus");
        let feed = dir.join("input").join(BUS_FOLDER).join("city_bus");
        std::fs::create_dir_all(&feed).unwrap();
        std::fs::write(
            feed.join("stops.txt"),
            "stop_id,stop_name,stop_lat,stop_lon\nA,Alpha,0.1,0.1\nB,Beta,0.2,0.2\n",
        )
        .unwrap();
        std::fs::write(feed.join("routes.txt"), "route_id,agency_id\nR1,AG\n").unwrap();
        std::fs::write(feed.join("trips.txt"), "route_id,trip_id\nR1,T1\nR1,T2\n").unwrap();
        std::fs::write(
            feed.join("stop_times.txt"),
            "trip_id,stop_id,stop_sequence\nT1,A,1\nT1,B,2\nT2,A,1\nT2,B,2\n",
        )
        .unwrap();
        let mut store = store_in(&dir);
        seed_zones(&mut store);

        TransportationIngestor
            .ingest(&IngestContext::new(dir.join("input")), &mut store)
            .unwrap();

        let stops = store.load_layer(BUS_STOP_LAYER).unwrap();
        assert_eq!(stops.len(), 2);
        assert_eq!(stops.features[0].i64("stop_times_count"), Some(2));
        let lines = store.load_layer(BUS_LAYER).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines.features[0].text("agency_id"), "AG");
        assert_eq!(lines.features[0].text("from_stop_id"), "A");

        drop(store);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn traffic_counts_are_integers() {
        let dir = scratch_dir("transport_traffic");
        let input = dir.join("input");
        let fields: Vec<DbfField> = TRAFFIC_FIELDS
            .iter()
            .map(|(from, _)| DbfField::text(from, 12))
            .collect();
        let mut row: Vec<AttrValue> = vec!["Metro".into(), "2018".into(), "1".into(), "Z1".into()];
        row.extend((5..=35).map(|i| AttrValue::from(i.to_string())));
        shapefile(
            &input,
            &format!("{TRAFFIC_FOLDER}/flow.shp"),
            ShapeType::Polygon,
            vec![rect(0.0, 0.0, 1.0, 1.0)],
            &fields,
            &[row],
        );
        let mut store = store_in(&dir);
        seed_zones(&mut store);

        TransportationIngestor
            .ingest(&IngestContext::new(&input), &mut store)
            .unwrap();

        let traffic = store.load_layer(TRAFFIC_LAYER).unwrap();
        let flow = &traffic.features[0];
        assert_eq!(flow.text("survey_year"), "2018");
        assert_eq!(flow.get("rail_total_trip_count"), &AttrValue::Int(10));
        assert_eq!(flow.get("total_trip_count"), &AttrValue::Int(35));

        drop(store);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
