//! Coverage buffers, planning areas and hazard areas.

use geo::Geometry;
use plateau_stats_messages::{Message, label, tr};
use plateau_stats_models::hazard::SCALE_FIELD;
use plateau_stats_models::{ErrorKind, Feature, GeometryKind, HazardKind, Layer, ScaleClass};
use plateau_stats_source::discovery::find_shapefiles;
use plateau_stats_spatial::buffer::{DEFAULT_QUADRANT_SEGMENTS, circle};
use plateau_stats_spatial::convert::as_point;
use plateau_stats_spatial::dissolve::dissolve_layer;
use plateau_stats_spatial::hazard::{HazardSet, composite_hazards};
use plateau_stats_spatial::network::{RoadGraph, shelter_reach};
use plateau_stats_store::SpatialContainerStore;
use strum::IntoEnumIterator;

use crate::common::{
    FieldMap, cannot_load, load_shapefiles, map_feature, output_fields, push_checked, recover,
    repair_logged, retain_intersecting, source_fields, zone_index,
};
use crate::transportation::{BUS_STOP_LAYER, ROAD_LAYER, STATION_LAYER};
use crate::{Domain, IngestContext, IngestError, IngestReport, Ingestor, population, zone};

/// Railway station coverage layer.
pub const STATION_BUFFER_LAYER: &str = "railway_station_buffers";
/// Bus stop coverage layer.
pub const BUS_BUFFER_LAYER: &str = "bus_stop_buffers";
/// Shelter point layer.
pub const SHELTER_LAYER: &str = "shelters";
/// Shelter walking reach layer.
pub const SHELTER_BUFFER_LAYER: &str = "shelter_buffers";
/// Residential and urban function induction areas.
pub const INDUCTION_LAYER: &str = "induction_areas";
/// City planning areas.
pub const URBAN_PLANNING_LAYER: &str = "urbun_plannings";
/// Land use zoning areas.
pub const LAND_USE_LAYER: &str = "land_use_areas";
/// Per-cell hazard classes.
pub const HAZARD_COMPOSITE_LAYER: &str = "hazard_composite";

/// Field holding the buffer radius in meters.
pub const BUFFER_DISTANCE: &str = "buffer_distance";

/// `type_id` of residential induction areas.
pub const RESIDENTIAL_INDUCTION: i64 = 31;
/// `type_id` of urban function induction areas.
pub const URBAN_FUNCTION_INDUCTION: i64 = 32;
/// `type_id` of the whole plan area.
pub const WHOLE_PLAN_AREA: i64 = 0;

const SHELTER_FOLDER: &str = "避難所";
const PLANNING_FOLDER: &str = "誘導区域";

const SHELTER_FIELDS: FieldMap = &[
    ("P20_001", "code"),
    ("P20_002", "name"),
    ("P20_003", "address"),
    ("P20_004", "type"),
    ("P20_005", "capacity"),
    ("P20_006", "scale"),
    ("P20_007", "earthquake"),
    ("P20_008", "tsunami"),
];

const INDUCTION_FIELDS: FieldMap = &[
    ("区域区分", "type"),
    ("kubunID", "type_id"),
    ("Pref", "prefecture_name"),
    ("Citycode", "city_code"),
    ("Cityname", "city_name"),
    ("当初決定日", "first_decision_date"),
    ("最終告示日", "last_decision_date"),
    ("決定区分", "decision_type"),
    ("決定者", "decider"),
    ("告示番号S", "notice_number_s"),
    ("告示番号L", "notice_number_l"),
];

const URBAN_PLANNING_FIELDS: FieldMap = &[
    ("tokeiname", "tokei_name"),
    ("Type", "type"),
    ("kubunID", "type_id"),
    ("Pref", "prefecture_name"),
    ("Citycode", "city_code"),
    ("Cityname", "city_name"),
    ("当初決定日", "first_decision_date"),
    ("最終告示日", "last_decision_date"),
    ("決定区分", "decision_type"),
    ("決定者", "decider"),
    ("告示番号S", "notice_number_s"),
    ("告示番号L", "notice_number_l"),
];

const LAND_USE_FIELDS: FieldMap = &[
    ("用途地域", "type"),
    ("YoutoID", "type_id"),
    ("容積率", "floor_area_ratio"),
    ("建ぺい率", "building_coverage_ratio"),
    ("Pref", "prefecture_name"),
    ("Citycode", "city_code"),
    ("Cityname", "city_name"),
    ("当初決定日", "first_decision_date"),
    ("最終告示日", "last_decision_date"),
    ("決定区分", "decision_type"),
    ("決定者", "decider"),
    ("告示番号S", "notice_number_s"),
    ("告示番号L", "notice_number_l"),
];

/// One planning area class sharing the `誘導区域` folder.
struct PlanningClass {
    layer: &'static str,
    name: &'static str,
    fields: FieldMap,
}

const PLANNING_CLASSES: [PlanningClass; 3] = [
    PlanningClass {
        layer: INDUCTION_LAYER,
        name: "induction area",
        fields: INDUCTION_FIELDS,
    },
    PlanningClass {
        layer: URBAN_PLANNING_LAYER,
        name: "urbun planning",
        fields: URBAN_PLANNING_FIELDS,
    },
    PlanningClass {
        layer: LAND_USE_LAYER,
        name: "land use area",
        fields: LAND_USE_FIELDS,
    },
];

/// A hazard area dataset.
pub struct HazardSource {
    /// Output layer.
    pub layer: &'static str,
    /// Source folder under the input root.
    pub folder: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Source to output field mapping; every source field is required.
    pub fields: FieldMap,
}

/// Hazard datasets in processing order.
pub const HAZARD_SOURCES: [HazardSource; 6] = [
    HazardSource {
        layer: "hazard_area_planned_scales",
        folder: "ハザードエリア計画規模",
        name: "hazard area planned scale",
        fields: &[("A31b_101", "rank")],
    },
    HazardSource {
        layer: "hazard_area_maximum_scales",
        folder: "ハザードエリア想定最大規模",
        name: "hazard area maximum scale",
        fields: &[("A31b_201", "rank")],
    },
    HazardSource {
        layer: "hazard_area_storm_surges",
        folder: "ハザードエリア高潮浸水想定区域",
        name: "hazard area storm surge",
        fields: &[
            ("A49_001", "prefecture_name"),
            ("A49_002", "prefecture_code"),
            ("A49_003", "rank"),
        ],
    },
    HazardSource {
        layer: "hazard_area_tsunamis",
        folder: "ハザードエリア津波浸水想定区域",
        name: "hazard area tsunami",
        fields: &[
            ("A40_001", "prefecture_name"),
            ("A40_002", "prefecture_code"),
            ("A40_003", "rank"),
        ],
    },
    HazardSource {
        layer: "hazard_area_landslides",
        folder: "ハザードエリア土砂災害",
        name: "hazard area landslide",
        fields: &[
            ("A33_001", "phenomenon_type"),
            ("A33_002", "area_type"),
            ("A33_004", "area_number"),
            ("A33_005", "area_name"),
            ("A33_006", "address"),
            ("A33_007", "public_date"),
            ("A33_008", "designated_flag"),
        ],
    },
    HazardSource {
        layer: "hazard_area_floodplains",
        folder: "ハザードエリア氾濫流",
        name: "hazard area floodplain",
        fields: &[("A31b_401", "rank")],
    },
];

/// Builds the area layers.
pub struct AreaIngestor;

impl Ingestor for AreaIngestor {
    fn domain(&self) -> Domain {
        Domain::Area
    }

    fn ingest(
        &self,
        ctx: &IngestContext,
        store: &mut SpatialContainerStore,
    ) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::default();

        let parts: [(&str, Part); 5] = [
            ("railway station buffer", station_buffers),
            ("bus stop buffer", bus_stop_buffers),
            ("shelter", shelters),
            ("shelter buffer", shelter_buffers),
            ("induction area", planning_areas),
        ];
        for (name, part) in parts {
            let outcome = part(ctx, store, &mut report);
            recover(&mut report, name, outcome)?;
        }
        for source in &HAZARD_SOURCES {
            let outcome = hazard_area(ctx, store, &mut report, source);
            recover(&mut report, source.name, outcome)?;
        }
        let outcome = hazard_composite(store, &mut report);
        recover(&mut report, "hazard composite", outcome)?;

        Ok(report)
    }
}

type Part =
    fn(&IngestContext, &mut SpatialContainerStore, &mut IngestReport) -> Result<(), IngestError>;

fn station_buffers(
    ctx: &IngestContext,
    store: &mut SpatialContainerStore,
    report: &mut IngestReport,
) -> Result<(), IngestError> {
    point_buffers(
        store,
        report,
        STATION_LAYER,
        STATION_BUFFER_LAYER,
        ctx.options.railway_m,
        ctx.options.dissolve_buffers,
    )
}

fn bus_stop_buffers(
    ctx: &IngestContext,
    store: &mut SpatialContainerStore,
    report: &mut IngestReport,
) -> Result<(), IngestError> {
    point_buffers(
        store,
        report,
        BUS_STOP_LAYER,
        BUS_BUFFER_LAYER,
        ctx.options.bus_m,
        ctx.options.dissolve_buffers,
    )
}

/// Circles of `radius_m` around every point of `source`, keeping its
/// attributes and adding [`BUFFER_DISTANCE`].
fn point_buffers(
    store: &mut SpatialContainerStore,
    report: &mut IngestReport,
    source: &str,
    output: &str,
    radius_m: f64,
    dissolve: bool,
) -> Result<(), IngestError> {
    let points = store.load_layer(source)?;

    let mut fields: Vec<&str> = points.fields.iter().map(String::as_str).collect();
    fields.push(BUFFER_DISTANCE);
    let mut layer = Layer::new(output, GeometryKind::Polygon).with_fields(&fields);

    for (index, feature) in points.features.iter().enumerate() {
        let Some(point) = feature.geometry.as_ref().and_then(as_point) else {
            let reason = tr(Message::NotAPoint, &[&index, &points.name]);
            log::warn!("{reason}");
            report.skip(format!("{}#{index}", points.name), reason, ErrorKind::Format);
            continue;
        };
        let mut buffered =
            Feature::new(Geometry::Polygon(circle(point, radius_m, DEFAULT_QUADRANT_SEGMENTS)));
        buffered.attributes = feature.attributes.clone();
        buffered.set(BUFFER_DISTANCE, radius_m);
        layer.push(buffered);
    }

    if dissolve {
        dissolve_layer(&mut layer, BUFFER_DISTANCE);
    }
    report.write(store, &layer)
}

fn shelters(
    ctx: &IngestContext,
    store: &mut SpatialContainerStore,
    report: &mut IngestReport,
) -> Result<(), IngestError> {
    let folder = ctx.path(SHELTER_FOLDER);
    if find_shapefiles(&folder).is_empty() {
        return Err(IngestError::ShapefileNotFound {
            label: label("shelter"),
        });
    }
    let required = source_fields(SHELTER_FIELDS);

    let mut layer =
        Layer::new(SHELTER_LAYER, GeometryKind::Point).with_fields(&output_fields(SHELTER_FIELDS));
    for data in load_shapefiles(&folder, report) {
        let name = data.display_name();
        if !data.has_fields(&required) {
            cannot_load(report, &name, "shelter");
            continue;
        }
        for (index, source) in data.features.iter().enumerate() {
            let mut feature = map_feature(source, SHELTER_FIELDS);
            let scale = feature.i64("scale");
            feature.set("scale", scale);
            push_checked(&mut layer, feature, &name, index, report);
        }
    }
    report.write(store, &layer)
}

fn shelter_buffers(
    ctx: &IngestContext,
    store: &mut SpatialContainerStore,
    report: &mut IngestReport,
) -> Result<(), IngestError> {
    let shelters = store.load_layer(SHELTER_LAYER)?;
    let graph = if store.contains(ROAD_LAYER)? {
        Some(RoadGraph::from_layer(&store.load_layer(ROAD_LAYER)?))
    } else {
        log::warn!("{}", tr(Message::LayerNotFound, &[&ROAD_LAYER]));
        None
    };
    let threshold = ctx.options.shelter_m;

    let mut layer = Layer::new(SHELTER_BUFFER_LAYER, GeometryKind::Polygon)
        .with_fields(&["shelter_id", BUFFER_DISTANCE]);
    for (index, shelter) in shelters.features.iter().enumerate() {
        let Some(point) = shelter.geometry.as_ref().and_then(as_point) else {
            let found = shelter
                .geometry
                .as_ref()
                .map_or("None", plateau_stats_spatial::geometry_type_name);
            let reason = tr(Message::ShelterNotPoint, &[&found]);
            log::warn!("{reason}");
            report.skip(format!("{SHELTER_LAYER}#{index}"), reason, ErrorKind::Format);
            continue;
        };
        let reach = shelter_reach(graph.as_ref(), point, shelter.i64("scale"), threshold);
        if reach.0.is_empty() {
            continue;
        }
        layer.push(
            Feature::new(Geometry::MultiPolygon(reach))
                .with("shelter_id", index.to_string())
                .with(BUFFER_DISTANCE, threshold),
        );
    }

    if ctx.options.dissolve_buffers {
        dissolve_layer(&mut layer, BUFFER_DISTANCE);
        for feature in &mut layer.features {
            feature.set("shelter_id", None::<String>);
        }
    }
    report.write(store, &layer)
}

/// Sorts the `誘導区域` files into induction, city planning and land use
/// layers by their columns.
fn planning_areas(
    ctx: &IngestContext,
    store: &mut SpatialContainerStore,
    report: &mut IngestReport,
) -> Result<(), IngestError> {
    let folder = ctx.path(PLANNING_FOLDER);
    if find_shapefiles(&folder).is_empty() {
        return Err(IngestError::ShapefileNotFound {
            label: label("induction area"),
        });
    }

    let mut layers: Vec<Layer> = PLANNING_CLASSES
        .iter()
        .map(|class| {
            Layer::new(class.layer, GeometryKind::Polygon).with_fields(&output_fields(class.fields))
        })
        .collect();

    for data in load_shapefiles(&folder, report) {
        let name = data.display_name();
        let mut matched = false;
        for (class, layer) in PLANNING_CLASSES.iter().zip(layers.iter_mut()) {
            if !data.has_fields(&source_fields(class.fields)) {
                continue;
            }
            matched = true;
            for (index, source) in data.features.iter().enumerate() {
                let mut feature = map_feature(source, class.fields);
                let type_id = feature.i64("type_id");
                feature.set("type_id", type_id);
                push_checked(layer, feature, &name, index, report);
            }
        }
        if !matched {
            cannot_load(report, &name, "induction area");
        }
    }

    for (class, mut layer) in PLANNING_CLASSES.iter().zip(layers) {
        if layer.is_empty() {
            let reason = tr(Message::NoValidShapefile, &[&label(class.name)]);
            log::warn!("{reason}");
            report.skip(class.layer, reason, ErrorKind::MissingInput);
            continue;
        }
        repair_logged(&mut layer, report);
        report.write(store, &layer)?;
    }
    Ok(())
}

fn hazard_area(
    ctx: &IngestContext,
    store: &mut SpatialContainerStore,
    report: &mut IngestReport,
    source: &HazardSource,
) -> Result<(), IngestError> {
    let zones = zone_index(store)?;
    let required = source_fields(source.fields);

    let mut fields = output_fields(source.fields);
    fields.push(SCALE_FIELD);
    let mut layer = Layer::new(source.layer, GeometryKind::Polygon).with_fields(&fields);

    for data in load_shapefiles(&ctx.path(source.folder), report) {
        let name = data.display_name();
        if !data.has_fields(&required) {
            cannot_load(report, &name, source.name);
            continue;
        }
        let scale = ScaleClass::from_path(&data.path.to_string_lossy());
        for (index, source_feature) in data.features.iter().enumerate() {
            let feature = map_feature(source_feature, source.fields).with(SCALE_FIELD, scale.code());
            push_checked(&mut layer, feature, &name, index, report);
        }
    }

    if layer.is_empty() {
        log::info!("{}", tr(Message::NoValidShapefile, &[&label(source.name)]));
    } else {
        repair_logged(&mut layer, report);
        retain_intersecting(&mut layer, &zones);
    }
    report.write(store, &layer)
}

/// Hazard classes per mesh, or per zone when meshes are absent.
fn hazard_composite(
    store: &mut SpatialContainerStore,
    report: &mut IngestReport,
) -> Result<(), IngestError> {
    let cells = if store.contains(population::LAYER)? {
        store.load_layer(population::LAYER)?
    } else {
        store.load_layer(zone::LAYER)?
    };

    let mut composite = Layer::new(HAZARD_COMPOSITE_LAYER, GeometryKind::Polygon)
        .with_fields(&["key_code"]);
    for cell in &cells.features {
        composite.push(Feature::new(cell.geometry.clone()).with("key_code", cell.get("key_code").clone()));
    }

    let mut sets = Vec::new();
    for kind in HazardKind::iter() {
        let mut layers = Vec::new();
        for name in kind.layer_names() {
            if store.contains(name)? {
                layers.push(store.load_layer(name)?);
            }
        }
        let refs: Vec<&Layer> = layers.iter().collect();
        sets.push(HazardSet::new(kind, &refs));
    }
    composite_hazards(&mut composite, &sets);

    report.write(store, &composite)
}
