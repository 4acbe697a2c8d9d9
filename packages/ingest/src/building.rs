//! Building footprints with detail attributes and river flood depth
//! (`buildings`).

use std::collections::BTreeMap;
use std::path::Path;

use plateau_stats_models::{AttrValue, ErrorKind, Feature, GeometryKind, Layer};
use plateau_stats_source::discovery::find_files;
use plateau_stats_source::table::read_csv;
use plateau_stats_store::SpatialContainerStore;

use crate::common::{parse_cell, push_checked, repair_logged, require_shapefiles, to_snake_case};
use crate::{Domain, IngestContext, IngestError, IngestReport, Ingestor};

/// Output layer name.
pub const LAYER: &str = "buildings";

/// Source folder under the input root.
pub const FOLDER: &str = "建築物";

/// Detail attribute table, joined on `parent` = building `id`.
pub const DETAIL_TABLE: &str = "BuildingDetailAttribute.csv";

/// Flood depth columns filled from the `RiverFloodingRisk` tables.
pub const FLOOD_LEVELS: [(&str, &str); 2] = [("L1", "flood_depth_l1"), ("L2", "flood_depth_l2")];

/// Builds `buildings`.
pub struct BuildingIngestor;

impl Ingestor for BuildingIngestor {
    fn domain(&self) -> Domain {
        Domain::Building
    }

    fn ingest(
        &self,
        ctx: &IngestContext,
        store: &mut SpatialContainerStore,
    ) -> Result<IngestReport, IngestError> {
        let folder = ctx.path(FOLDER);
        let mut report = IngestReport::default();
        let sources = require_shapefiles(&folder, &Domain::Building.label(), &mut report)?;

        let mut layer = Layer::new(LAYER, GeometryKind::Polygon);
        for data in sources {
            let name = data.display_name();
            for field in &data.fields {
                layer.ensure_field(&to_snake_case(field));
            }
            for (index, source) in data.features.into_iter().enumerate() {
                let mut feature = Feature::new(source.geometry);
                for (key, value) in source.attributes {
                    feature.set(&to_snake_case(&key), value);
                }
                push_checked(&mut layer, feature, &name, index, &mut report);
            }
        }

        join_details(&mut layer, &folder.join(DETAIL_TABLE), &mut report);
        for (level, column) in FLOOD_LEVELS {
            let depths = flood_depths(&folder, level, &mut report);
            layer.ensure_field(column);
            for feature in &mut layer.features {
                let depth = depths.get(&feature.text("id")).copied();
                feature.set(column, depth);
            }
        }

        repair_logged(&mut layer, &mut report);
        report.write(store, &layer)?;
        Ok(report)
    }
}

/// Left-joins the detail table onto `layer` by `parent` = `id`. Detail
/// columns are snake_cased; the join key itself is not copied.
fn join_details(layer: &mut Layer, path: &Path, report: &mut IngestReport) {
    if !path.is_file() {
        log::debug!("No building detail table at {}", path.display());
        return;
    }
    let table = match read_csv(path) {
        Ok(table) => table,
        Err(e) => {
            log::warn!("{e}");
            report.skip(path.display(), &e, e.kind());
            return;
        }
    };
    let Some(parent) = table.column("parent") else {
        log::warn!("{} has no parent column", path.display());
        report.skip(path.display(), "no parent column", ErrorKind::Format);
        return;
    };

    let columns: Vec<(usize, String)> = table
        .headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != parent)
        .map(|(i, h)| (i, to_snake_case(h)))
        .collect();
    for (_, name) in &columns {
        layer.ensure_field(name);
    }

    let mut by_parent: BTreeMap<&str, &[String]> = BTreeMap::new();
    for row in &table.rows {
        if let Some(key) = row.get(parent) {
            by_parent.insert(key.trim(), row);
        }
    }

    for feature in &mut layer.features {
        let id = feature.text("id");
        let Some(row) = by_parent.get(id.as_str()) else {
            continue;
        };
        for (i, name) in &columns {
            let value = row.get(*i).map_or(AttrValue::Null, |cell| parse_cell(cell));
            feature.set(name, value);
        }
    }
}

/// Maximum `depth` per `parent` over every `RiverFloodingRisk` table whose
/// name contains `level`.
fn flood_depths(folder: &Path, level: &str, report: &mut IngestReport) -> BTreeMap<String, f64> {
    let mut depths: BTreeMap<String, f64> = BTreeMap::new();
    let tables = find_files(folder, "csv").into_iter().filter(|p| {
        p.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .is_some_and(|n| n.contains("RiverFloodingRisk") && n.contains(level))
    });

    for path in tables {
        let table = match read_csv(&path) {
            Ok(table) => table,
            Err(e) => {
                log::warn!("{e}");
                report.skip(path.display(), &e, e.kind());
                continue;
            }
        };
        for row in &table.rows {
            let (Some(parent), Some(depth)) = (
                table.cell(row, "parent"),
                table.cell(row, "depth").and_then(|d| d.parse::<f64>().ok()),
            ) else {
                continue;
            };
            depths
                .entry(parent.to_string())
                .and_modify(|d| *d = d.max(depth))
                .or_insert(depth);
        }
    }
    depths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{rect, scratch_dir, shapefile, store_in};
    use approx::assert_relative_eq;
    use plateau_stats_source::shp::ShapeType;
    use plateau_stats_source::write::DbfField;

    #[test]
    fn details_and_flood_depths_are_joined() {
        let dir = scratch_dir("building_ingest");
        let input = dir.join("input");
        shapefile(
            &input,
            &format!("{FOLDER}/bldg.shp"),
            ShapeType::Polygon,
            vec![rect(0.0, 0.0, 0.1, 0.1), rect(0.2, 0.2, 0.3, 0.3)],
            &[DbfField::text("id", 10), DbfField::numeric("totalFloor", 10, 0)],
            &[
                vec!["b1".into(), 120_i64.into()],
                vec!["b2".into(), 80_i64.into()],
            ],
        );
        std::fs::write(
            input.join(FOLDER).join(DETAIL_TABLE),
            "parent,buildingStructureType,usage\nb1,610,住宅\n",
        )
        .unwrap();
        std::fs::write(
            input.join(FOLDER).join("RiverFloodingRisk_A_L1.csv"),
            "parent,depth\nb1,0.5\nb1,1.2\n",
        )
        .unwrap();
        std::fs::write(
            input.join(FOLDER).join("RiverFloodingRisk_B_L1.csv"),
            "parent,depth\nb1,0.8\nb2,0.3\n",
        )
        .unwrap();
        let mut store = store_in(&dir);

        BuildingIngestor.ingest(&IngestContext::new(&input), &mut store).unwrap();

        let layer = store.load_layer(LAYER).unwrap();
        assert!(layer.has_field("total_floor"));
        assert!(layer.has_field("building_structure_type"));
        assert!(layer.has_field("flood_depth_l2"));
        assert!(!layer.has_field("parent"));

        let b1 = &layer.features[0];
        assert_eq!(b1.text("usage"), "住宅");
        assert_eq!(b1.i64("building_structure_type"), Some(610));
        assert_relative_eq!(b1.f64("flood_depth_l1").unwrap(), 1.2);
        assert!(b1.get("flood_depth_l2").is_null());

        let b2 = &layer.features[1];
        assert!(b2.get("usage").is_null());
        assert_relative_eq!(b2.f64("flood_depth_l1").unwrap(), 0.3);

        drop(store);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
