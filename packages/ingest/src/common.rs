//! Steps shared by the file-based ingestors: discovery, field mapping,
//! geometry checks and zone filtering.

use std::path::Path;
use std::sync::LazyLock;

use plateau_stats_messages::{Message, label, tr};
use plateau_stats_models::{AttrValue, ErrorKind, Feature, GeometryKind, Layer, Year};
use plateau_stats_source::SourceError;
use plateau_stats_source::discovery::find_shapefiles;
use plateau_stats_source::shapefile::{ShapefileData, read_shapefile};
use plateau_stats_source::year::extract_year_below;
use plateau_stats_spatial::repair::repair_layer;
use plateau_stats_spatial::{PolygonIndex, geometry_type_name};
use plateau_stats_store::SpatialContainerStore;
use regex::Regex;

use crate::{IngestError, IngestReport};

/// `(source field, output field)` pairs.
pub type FieldMap = &'static [(&'static str, &'static str)];

/// Reads every Shapefile under `dir`.
///
/// Files that cannot be read (no DBF sidecar, undecodable text, broken
/// geometry records) are logged, recorded in `report` and left out.
pub fn load_shapefiles(dir: &Path, report: &mut IngestReport) -> Vec<ShapefileData> {
    let mut loaded = Vec::new();
    for path in find_shapefiles(dir) {
        log::info!("{}", tr(Message::ShapefileToImport, &[&path.display()]));
        match read_shapefile(&path) {
            Ok(data) => loaded.push(data),
            Err(e) => {
                let reason = match &e {
                    SourceError::MissingTable { path } => {
                        tr(Message::MissingDbf, &[&path.display()])
                    }
                    SourceError::Encoding { path } => {
                        tr(Message::DecodeFailed, &[&path.display()])
                    }
                    other => other.to_string(),
                };
                log::warn!("{reason}");
                report.skip(path.display(), reason, e.kind());
            }
        }
    }
    loaded
}

/// Like [`load_shapefiles`] but fails when nothing usable was found.
///
/// # Errors
///
/// * [`IngestError::ShapefileNotFound`] if `dir` holds no `.shp` file
/// * [`IngestError::NoValidShapefile`] if every file had to be skipped
pub fn require_shapefiles(
    dir: &Path,
    label: &str,
    report: &mut IngestReport,
) -> Result<Vec<ShapefileData>, IngestError> {
    if find_shapefiles(dir).is_empty() {
        return Err(IngestError::ShapefileNotFound {
            label: label.to_string(),
        });
    }
    let loaded = load_shapefiles(dir, report);
    if loaded.is_empty() {
        return Err(IngestError::NoValidShapefile {
            label: label.to_string(),
        });
    }
    Ok(loaded)
}

/// Copies `mapping`'s source fields of `feature` under their output names.
/// Missing source fields become null.
#[must_use]
pub fn map_feature(feature: &Feature, mapping: FieldMap) -> Feature {
    let mut mapped = Feature::new(feature.geometry.clone());
    for (from, to) in mapping {
        mapped.set(to, feature.get(from).clone());
    }
    mapped
}

/// The output field names of `mapping`, in order.
#[must_use]
pub fn output_fields(mapping: FieldMap) -> Vec<&'static str> {
    mapping.iter().map(|(_, to)| *to).collect()
}

/// The source field names of `mapping`, in order.
#[must_use]
pub fn source_fields(mapping: FieldMap) -> Vec<&'static str> {
    mapping.iter().map(|(from, _)| *from).collect()
}

static CAMEL_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.)([A-Z][a-z]+)").unwrap_or_else(|_| unreachable!()));
static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").unwrap_or_else(|_| unreachable!()));

/// `totalFloorArea` -> `total_floor_area`, `KEY_CODE` -> `key_code`.
#[must_use]
pub fn to_snake_case(name: &str) -> String {
    let spaced = CAMEL_WORD.replace_all(name, "${1}_${2}");
    CAMEL_BOUNDARY
        .replace_all(&spaced, "${1}_${2}")
        .to_lowercase()
}

/// Text cell to the narrowest attribute type: blank is null, then integer,
/// then real, else text.
#[must_use]
pub fn parse_cell(cell: &str) -> AttrValue {
    let cell = cell.trim();
    if cell.is_empty() {
        return AttrValue::Null;
    }
    if let Ok(v) = cell.parse::<i64>() {
        return AttrValue::Int(v);
    }
    cell.parse::<f64>()
        .map_or_else(|_| AttrValue::Text(cell.to_string()), AttrValue::from)
}

/// Repairs `layer` in place, logging progress and recording each dropped
/// feature in `report`.
pub fn repair_logged(layer: &mut Layer, report: &mut IngestReport) {
    log::info!("{}", tr(Message::FixingGeometries, &[&layer.name]));
    let outcome = repair_layer(layer);
    for (index, reason) in &outcome.dropped {
        log::warn!(
            "{}",
            tr(Message::FeatureDropped, &[index, &layer.name, reason])
        );
        report.skip(format!("{}#{index}", layer.name), reason, ErrorKind::Geometry);
    }
    if outcome.fixed > 0 {
        log::debug!("Repaired {} geometries in {}", outcome.fixed, layer.name);
    }
    log::info!("{}", tr(Message::FixedGeometries, &[&layer.name]));
}

/// Appends `feature` to `layer` when its geometry matches the layer kind.
///
/// Features without geometry are kept for attribute-only layers only.
/// Rejected features are logged and recorded; returns whether it was kept.
pub fn push_checked(
    layer: &mut Layer,
    feature: Feature,
    source: &str,
    index: usize,
    report: &mut IngestReport,
) -> bool {
    let accepted = match (&feature.geometry, layer.kind) {
        (None, GeometryKind::None) => true,
        (None, _) => false,
        (Some(_), GeometryKind::None) => true,
        (Some(geometry), kind) => kind.accepts(geometry),
    };
    if accepted {
        layer.push(feature);
        return true;
    }

    let found = feature
        .geometry
        .as_ref()
        .map_or("None", geometry_type_name);
    let reason = tr(Message::UnsupportedGeometry, &[&found]);
    log::warn!("{source}#{index}: {reason}");
    report.skip(format!("{source}#{index}"), reason, ErrorKind::Format);
    false
}

/// Loads `zones` and indexes its polygons.
///
/// # Errors
///
/// * [`IngestError::Store`] if the zones layer is missing
pub fn zone_index(store: &SpatialContainerStore) -> Result<PolygonIndex, IngestError> {
    let zones = store.load_layer(crate::zone::LAYER)?;
    Ok(PolygonIndex::from_layer(&zones))
}

/// Drops features of `layer` that do not intersect any polygon of `zones`.
pub fn retain_intersecting(layer: &mut Layer, zones: &PolygonIndex) {
    let before = layer.len();
    layer.features.retain(|f| {
        f.geometry
            .as_ref()
            .is_some_and(|g| zones.any_intersects(g))
    });
    log::debug!(
        "{}: kept {} of {before} features inside the zones",
        layer.name,
        layer.len()
    );
}

/// Records a failed sub-dataset in `report` and carries on.
///
/// Container write failures are returned, since nothing after them can be
/// persisted either.
///
/// # Errors
///
/// * the original error when its kind is [`ErrorKind::Persistence`]
pub fn recover(
    report: &mut IngestReport,
    name: &str,
    outcome: Result<(), IngestError>,
) -> Result<(), IngestError> {
    match outcome {
        Ok(()) => {
            log::info!("{}", tr(Message::GenerationCompleted, &[&label(name)]));
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::Persistence => Err(e),
        Err(e) => {
            log::error!("{}", tr(Message::ErrorOccurred, &[&e]));
            report.skip(label(name), &e, e.kind());
            Ok(())
        }
    }
}

/// Logs and records a file whose columns do not fit the dataset `name`.
pub fn cannot_load(report: &mut IngestReport, file: &str, name: &str) {
    let reason = tr(Message::CannotLoadAs, &[&file, &label(name)]);
    log::warn!("{reason}");
    report.skip(file, reason, ErrorKind::Format);
}

/// Year parsed from the part of `path` below the source folder `root`,
/// logging a warning when there is none.
#[must_use]
pub fn year_from_path(root: &Path, path: &Path) -> Option<Year> {
    let year = extract_year_below(root, path);
    if year.is_none() {
        log::warn!("{}", tr(Message::YearExtractionFailed, &[&path.display()]));
    }
    year
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{rect, scratch_dir, shapefile};
    use geo::{Geometry, Point};
    use plateau_stats_source::shp::ShapeType;
    use plateau_stats_source::write::DbfField;

    #[test]
    fn snake_case_handles_camel_and_upper() {
        assert_eq!(to_snake_case("totalFloorArea"), "total_floor_area");
        assert_eq!(to_snake_case("KEY_CODE"), "key_code");
        assert_eq!(to_snake_case("storeysAboveGround"), "storeys_above_ground");
        assert_eq!(to_snake_case("id"), "id");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
    }

    #[test]
    fn cells_parse_to_the_narrowest_type() {
        assert_eq!(parse_cell(" 12 "), AttrValue::Int(12));
        assert_eq!(parse_cell("1.5"), AttrValue::Real(1.5));
        assert_eq!(parse_cell("住宅"), AttrValue::Text("住宅".into()));
        assert_eq!(parse_cell(""), AttrValue::Null);
    }

    #[test]
    fn missing_table_skips_only_that_file() {
        let dir = scratch_dir("common_missing_dbf");
        shapefile(
            &dir,
            "a/good.shp",
            ShapeType::Polygon,
            vec![rect(0.0, 0.0, 1.0, 1.0)],
            &[DbfField::text("KEY_CODE", 10)],
            &[vec!["1".into()]],
        );
        shapefile(
            &dir,
            "b/orphan.shp",
            ShapeType::Polygon,
            vec![rect(0.0, 0.0, 1.0, 1.0)],
            &[DbfField::text("KEY_CODE", 10)],
            &[vec!["2".into()]],
        );
        std::fs::remove_file(dir.join("b/orphan.dbf")).unwrap();

        let mut report = IngestReport::default();
        let loaded = load_shapefiles(&dir, &mut report);

        assert_eq!(loaded.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].kind, ErrorKind::MissingInput);
        assert!(report.skipped[0].reason.contains("No corresponding DBF file"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn empty_folder_is_missing_input() {
        let dir = scratch_dir("common_empty");
        let mut report = IngestReport::default();
        let err = require_shapefiles(&dir.join("nothing"), "zone", &mut report).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingInput);
        assert_eq!(err.to_string(), "The Shapefile for zone was not found.");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn wrong_geometry_is_reported_not_kept() {
        let mut layer = Layer::new("vacancies", GeometryKind::Point);
        let mut report = IngestReport::default();

        assert!(push_checked(
            &mut layer,
            Feature::new(Geometry::Point(Point::new(0.5, 0.5))),
            "a.shp",
            0,
            &mut report
        ));
        assert!(!push_checked(
            &mut layer,
            Feature::new(rect(0.0, 0.0, 1.0, 1.0)),
            "a.shp",
            1,
            &mut report
        ));

        assert_eq!(layer.len(), 1);
        assert_eq!(report.skipped[0].item, "a.shp#1");
        assert_eq!(report.skipped[0].reason, "Unsupported geometry type: Polygon");
    }

    #[test]
    fn mapping_renames_and_fills_nulls() {
        const MAP: FieldMap = &[("KEY_CODE", "key_code"), ("PREF", "pref")];
        let source = Feature::new(rect(0.0, 0.0, 1.0, 1.0)).with("KEY_CODE", "5");
        let mapped = map_feature(&source, MAP);
        assert_eq!(mapped.text("key_code"), "5");
        assert!(mapped.get("pref").is_null());
        assert!(mapped.get("KEY_CODE").is_null());
        assert_eq!(output_fields(MAP), vec!["key_code", "pref"]);
    }
}
