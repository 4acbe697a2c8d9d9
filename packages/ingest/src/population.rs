//! 250 m population meshes with census, target and future population
//! (`meshes`, `population_target_settings`, `future_population`).

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::LazyLock;

use plateau_stats_messages::{Message, label, tr};
use plateau_stats_models::metric::round;
use plateau_stats_models::{ErrorKind, Feature, GeometryKind, Layer, Year};
use plateau_stats_source::discovery::{find_files, find_shapefiles, subdirectories};
use plateau_stats_source::table::read_csv;
use plateau_stats_store::SpatialContainerStore;
use regex::Regex;

use crate::census::{self, KEY_COLUMN};
use crate::common::{
    FieldMap, load_shapefiles, map_feature, output_fields, push_checked, repair_logged,
    require_shapefiles, retain_intersecting, year_from_path, zone_index,
};
use crate::{Domain, IngestContext, IngestError, IngestReport, Ingestor};

/// Mesh layer name.
pub const LAYER: &str = "meshes";
/// Target settings layer name (not listed on the panel).
pub const TARGET_LAYER: &str = "population_target_settings";
/// Merged future estimate layer name.
pub const FUTURE_LAYER: &str = "future_population";

/// Mesh polygons.
pub const MESH_FOLDER: &str = "250mメッシュ";
/// Census tables, one `<YYYY>年` folder per census.
pub const CENSUS_FOLDER: &str = "250mメッシュ人口";
/// Target settings table at the input root.
pub const TARGET_FILE: &str = "population_target_setting.csv";
/// 500 m future estimates.
pub const FUTURE_FOLDER: &str = "500mメッシュ別将来人口/H30国政局推計";

/// Future estimate attributes, stored as `{attr}_{year}` in the source.
pub const FUTURE_ATTRIBUTES: [&str; 26] = [
    "PTN", "PT0", "PT1", "PT2", "PT3", "PT4", "PT5", "PT6", "PT7", "PT8", "PT9", "PT10", "PT11",
    "PT12", "PT13", "PT14", "PT15", "PT16", "PT17", "PT18", "PT19", "PTA", "PTB", "PTC", "PTD",
    "PTE",
];

/// Area of one 250 m cell in hectares.
pub const CELL_AREA_HA: f64 = 6.25;

/// Future cells split evenly over this many 250 m cells when none of them
/// has a known population.
const EVEN_SPLIT: f64 = 4.0;

const MESH_FIELDS: FieldMap = &[
    ("KEY_CODE", "key_code"),
    ("MESH1_ID", "mesh1_id"),
    ("MESH2_ID", "mesh2_id"),
    ("MESH3_ID", "mesh3_id"),
    ("MESH4_ID", "mesh4_id"),
    ("MESH5_ID", "mesh5_id"),
    ("OBJ_ID", "obj_id"),
];

static FUTURE_PT0: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^future_\d{4}_PT0$").unwrap_or_else(|e| unreachable!("bad pattern: {e}"))
});

/// One row of the target settings table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetSetting {
    /// Future year the target refers to.
    pub comparative_year: Year,
    /// Target population for that year.
    pub target_population: f64,
}

/// Census values: year -> mesh key -> attribute -> value.
pub type CensusData = BTreeMap<Year, BTreeMap<String, BTreeMap<&'static str, i64>>>;

/// Builds the mesh layer and its companions.
pub struct PopulationIngestor;

impl Ingestor for PopulationIngestor {
    fn domain(&self) -> Domain {
        Domain::Population
    }

    fn ingest(
        &self,
        ctx: &IngestContext,
        store: &mut SpatialContainerStore,
    ) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::default();
        let sources = require_shapefiles(&ctx.path(MESH_FOLDER), &label("meshes"), &mut report)?;

        let mut meshes =
            Layer::new(LAYER, GeometryKind::Polygon).with_fields(&output_fields(MESH_FIELDS));
        for data in &sources {
            let name = data.display_name();
            for (index, feature) in data.features.iter().enumerate() {
                push_checked(&mut meshes, map_feature(feature, MESH_FIELDS), &name, index, &mut report);
            }
        }
        repair_logged(&mut meshes, &mut report);
        retain_intersecting(&mut meshes, &zone_index(store)?);

        let census = read_census(&ctx.path(CENSUS_FOLDER), &mut report);
        apply_census(&mut meshes, &census);

        let targets = read_targets(&ctx.path(TARGET_FILE))?;
        report.write_unlisted(store, &target_layer(&targets))?;

        let years: Vec<Year> = targets.iter().map(|t| t.comparative_year).collect();
        let latest = census.keys().next_back().copied();
        match load_future(&ctx.path(FUTURE_FOLDER), &mut report) {
            Some(future) => {
                report.write(store, &future)?;
                apportion_future(&mut meshes, &future, &years, latest);
                log::info!("{}", tr(Message::FuturePopulationAdded, &[]));
            }
            None => declare_future_fields(&mut meshes, &years),
        }

        derive_population_change(&mut meshes);
        report.write(store, &meshes)?;
        Ok(report)
    }
}

/// Reads every census table under `folder`.
///
/// Row 1 is the header and row 2 a description, which is skipped. Cells
/// that are not integers (`*`, `-`, blank) count as 0. Years without a
/// known layout are reported and skipped.
pub fn read_census(folder: &Path, report: &mut IngestReport) -> CensusData {
    let mut data = CensusData::new();
    for year_dir in subdirectories(folder) {
        let Some(year) = year_from_path(folder, &year_dir) else {
            report.skip(
                year_dir.display(),
                tr(Message::YearExtractionFailed, &[&year_dir.display()]),
                ErrorKind::Format,
            );
            continue;
        };
        let Some(layout) = census::layout(year) else {
            log::warn!("No census layout is known for {year}; {} skipped", year_dir.display());
            report.skip(year_dir.display(), format!("unknown census year {year}"), ErrorKind::Format);
            continue;
        };
        log::info!("Population data creation for year: {year}");

        let by_key = data.entry(year).or_default();
        for path in find_files(&year_dir, "txt") {
            let table = match read_csv(&path) {
                Ok(table) => table,
                Err(e) => {
                    log::warn!("{e}");
                    report.skip(path.display(), &e, e.kind());
                    continue;
                }
            };
            let Some(key_index) = table.column(KEY_COLUMN) else {
                report.skip(
                    path.display(),
                    tr(Message::FieldNotFound, &[&KEY_COLUMN]),
                    ErrorKind::Format,
                );
                continue;
            };
            let mapped: Vec<(usize, &'static str)> = table
                .headers
                .iter()
                .enumerate()
                .filter_map(|(i, h)| layout.attribute(h).map(|attr| (i, attr)))
                .collect();

            for row in table.rows.iter().skip(1) {
                let Some(key) = row.get(key_index).map(|k| k.trim()) else {
                    continue;
                };
                let values = by_key.entry(key.to_string()).or_default();
                for (i, attr) in &mapped {
                    let value = row
                        .get(*i)
                        .and_then(|v| v.trim().parse::<i64>().ok())
                        .unwrap_or(0);
                    values.insert(*attr, value);
                }
            }
        }
    }
    data
}

/// Adds `{year}_{attr}` and `{year}_rank` (people per hectare) to every
/// mesh; meshes without census rows keep nulls.
pub fn apply_census(meshes: &mut Layer, census: &CensusData) {
    for (year, by_key) in census {
        let Some(layout) = census::layout(*year) else {
            continue;
        };
        for attr in layout.attributes() {
            meshes.ensure_field(&format!("{year}_{attr}"));
        }
        let rank_field = format!("{year}_rank");
        meshes.ensure_field(&rank_field);

        for mesh in &mut meshes.features {
            let Some(values) = by_key.get(&mesh.text("key_code")) else {
                continue;
            };
            for (attr, value) in values {
                mesh.set(&format!("{year}_{attr}"), *value);
            }
            if let Some(population) = values.get("population") {
                #[allow(clippy::cast_precision_loss)]
                mesh.set(&rank_field, *population as f64 / CELL_AREA_HA);
            }
        }
    }
}

/// Reads the target settings table: a header line, then
/// `comparative_year,target_population` rows.
///
/// # Errors
///
/// * [`IngestError::FileNotFound`] if the table does not exist
/// * [`IngestError::EmptyTable`] if no row could be read
/// * [`IngestError::Source`] if the file is unreadable
pub fn read_targets(path: &Path) -> Result<Vec<TargetSetting>, IngestError> {
    if !path.is_file() {
        log::error!("{}", tr(Message::FileNotFound, &[&path.display()]));
        return Err(IngestError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let table = read_csv(path)?;
    let mut targets = Vec::new();
    for row in &table.rows {
        let parsed = (
            row.first().and_then(|y| y.trim().parse::<Year>().ok()),
            row.get(1).and_then(|p| p.trim().parse::<f64>().ok()),
        );
        let (Some(comparative_year), Some(target_population)) = parsed else {
            log::warn!("Skipping malformed row {row:?} in {}", path.display());
            continue;
        };
        log::info!(
            "{}",
            tr(Message::TargetPopulation, &[&comparative_year, &target_population])
        );
        targets.push(TargetSetting {
            comparative_year,
            target_population,
        });
    }
    if targets.is_empty() {
        log::error!("{}", tr(Message::TargetPopulationMissing, &[]));
        return Err(IngestError::EmptyTable {
            path: path.to_path_buf(),
        });
    }
    Ok(targets)
}

fn target_layer(targets: &[TargetSetting]) -> Layer {
    let mut layer = Layer::new(TARGET_LAYER, GeometryKind::None)
        .with_fields(&["comparative_year", "target_population"]);
    for target in targets {
        layer.push(
            Feature::new(None)
                .with("comparative_year", target.comparative_year.as_i64())
                .with("target_population", target.target_population),
        );
    }
    layer
}

/// Merges the future estimate Shapefiles; `None` (reported) when there are
/// none.
fn load_future(folder: &Path, report: &mut IngestReport) -> Option<Layer> {
    let name = label("future population");
    if find_shapefiles(folder).is_empty() {
        let reason = tr(Message::ShapefileNotFound, &[&name]);
        log::warn!("{reason}");
        report.skip(folder.display(), reason, ErrorKind::MissingInput);
        return None;
    }
    let mut layer = Layer::new(FUTURE_LAYER, GeometryKind::Polygon);
    for data in load_shapefiles(folder, report) {
        let source = data.display_name();
        for field in &data.fields {
            layer.ensure_field(field);
        }
        for (index, feature) in data.features.into_iter().enumerate() {
            push_checked(&mut layer, feature, &source, index, report);
        }
    }
    (!layer.is_empty()).then_some(layer)
}

fn future_field(year: Year, attr: &str) -> String {
    format!("future_{year}_{attr}")
}

fn declare_future_fields(meshes: &mut Layer, years: &[Year]) {
    for year in years {
        for attr in FUTURE_ATTRIBUTES {
            meshes.ensure_field(&future_field(*year, attr));
        }
    }
}

/// Apportions each 500 m future estimate onto the 250 m meshes whose
/// `mesh1_id..mesh4_id` concatenation equals its `MESH_ID`.
///
/// Shares follow the meshes' `{latest}_population`; meshes with an unknown
/// or zero population get 0. When no matching mesh has a population, every
/// match gets a quarter of the estimate.
pub fn apportion_future(meshes: &mut Layer, future: &Layer, years: &[Year], latest: Option<Year>) {
    declare_future_fields(meshes, years);

    let mut by_cell: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, mesh) in meshes.features.iter().enumerate() {
        let cell: String = ["mesh1_id", "mesh2_id", "mesh3_id", "mesh4_id"]
            .iter()
            .map(|f| mesh.text(f))
            .collect();
        by_cell.entry(cell).or_default().push(i);
    }
    let population_field = latest.map(|y| format!("{y}_population"));

    for estimate in &future.features {
        let Some(matches) = by_cell.get(&estimate.text("MESH_ID")) else {
            continue;
        };
        let known: Vec<(usize, f64)> = matches
            .iter()
            .filter_map(|&i| {
                let population = meshes.features[i].f64(population_field.as_deref()?)?;
                (population != 0.0).then_some((i, population))
            })
            .collect();
        let total: f64 = known.iter().map(|(_, p)| p).sum();

        for year in years {
            for attr in FUTURE_ATTRIBUTES {
                let Some(value) = estimate.f64(&format!("{attr}_{year}")).filter(|v| *v != 0.0)
                else {
                    continue;
                };
                let field = future_field(*year, attr);
                if total == 0.0 {
                    for &i in matches {
                        meshes.features[i].set(&field, value / EVEN_SPLIT);
                    }
                    continue;
                }
                if value < 0.0 {
                    continue;
                }
                for &i in matches {
                    meshes.features[i].set(&field, 0.0);
                }
                for &(i, population) in &known {
                    meshes.features[i].set(&field, round(value * population / total, 6));
                }
            }
        }
    }
}

/// Adds census-to-census change columns:
///
/// * `population_diff_{y}` and `population_diff_rate_{y}` (percent, 2
///   decimals, null when the previous population is not positive) for
///   every census year after the first
/// * `population_diff_rate_change_{latest}`: latest rate minus the one
///   before it
/// * `population_diff_future`: the first `future_{year}_PT0` minus the
///   latest population
pub fn derive_population_change(meshes: &mut Layer) {
    let years: Vec<Year> = meshes.years_with_suffix("population").into_iter().collect();
    let Some(&latest) = years.last() else {
        return;
    };
    for year in years.iter().skip(1) {
        meshes.ensure_field(&format!("population_diff_{year}"));
        meshes.ensure_field(&format!("population_diff_rate_{year}"));
    }
    let change_field = format!("population_diff_rate_change_{latest}");
    meshes.ensure_field(&change_field);
    meshes.ensure_field("population_diff_future");

    let future_field = meshes
        .fields
        .iter()
        .find(|f| FUTURE_PT0.is_match(f))
        .cloned();
    if future_field.is_none() {
        log::warn!("{}", tr(Message::FieldNotFound, &[&"future_xxx_PT0"]));
    }
    let latest_field = format!("{latest}_population");

    for mesh in &mut meshes.features {
        let mut previous_rate: Option<f64> = None;
        for pair in years.windows(2) {
            let (previous, current) = (pair[0], pair[1]);
            let (Some(now), Some(before)) = (
                mesh.i64(&format!("{current}_population")),
                mesh.i64(&format!("{previous}_population")),
            ) else {
                continue;
            };
            let diff = now - before;
            mesh.set(&format!("population_diff_{current}"), diff);

            let rate_field = format!("population_diff_rate_{current}");
            if before > 0 {
                #[allow(clippy::cast_precision_loss)]
                let rate = diff as f64 / before as f64 * 100.0;
                mesh.set(&rate_field, round(rate, 2));
                if current == latest {
                    mesh.set(&change_field, previous_rate.map(|p| round(rate - p, 2)));
                }
                previous_rate = Some(rate);
            } else {
                mesh.set(&rate_field, None::<f64>);
            }
        }

        let future = future_field.as_deref().and_then(|f| mesh.f64(f));
        if let (Some(future), Some(now)) = (future, mesh.f64(&latest_field)) {
            #[allow(clippy::cast_possible_truncation)]
            mesh.set("population_diff_future", (future - now).round() as i64);
        }
    }
}

/// Distinct comparative years of a loaded target settings layer.
#[must_use]
pub fn comparative_years(targets: &Layer) -> BTreeSet<Year> {
    targets.year_values("comparative_year")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{rect, scratch_dir, seed_zones, shapefile, store_in};
    use approx::assert_relative_eq;
    use plateau_stats_source::shp::ShapeType;
    use plateau_stats_source::write::DbfField;

    fn mesh(cell: &str, sub: &str, population: Option<i64>) -> Feature {
        Feature::new(rect(0.0, 0.0, 0.1, 0.1))
            .with("mesh1_id", &cell[..4])
            .with("mesh2_id", &cell[4..6])
            .with("mesh3_id", &cell[6..8])
            .with("mesh4_id", &cell[8..])
            .with("mesh5_id", sub)
            .with("2020_population", population)
    }

    #[test]
    fn future_estimates_follow_population_share() {
        let mut meshes = Layer::new(LAYER, GeometryKind::Polygon);
        meshes.push(mesh("533900001", "1", Some(30)));
        meshes.push(mesh("533900001", "2", Some(10)));
        meshes.push(mesh("533900001", "3", None));
        meshes.push(mesh("533900002", "1", Some(0)));
        meshes.push(mesh("533900002", "2", None));

        let mut future = Layer::new(FUTURE_LAYER, GeometryKind::Polygon);
        future.push(
            Feature::new(rect(0.0, 0.0, 0.2, 0.2))
                .with("MESH_ID", "533900001")
                .with("PT0_2040", 100.0),
        );
        future.push(
            Feature::new(rect(0.0, 0.0, 0.2, 0.2))
                .with("MESH_ID", "533900002")
                .with("PT0_2040", 10.0),
        );

        apportion_future(&mut meshes, &future, &[Year(2040)], Some(Year(2020)));

        let pt0 = |i: usize| meshes.features[i].f64("future_2040_PT0").unwrap();
        assert_relative_eq!(pt0(0), 75.0);
        assert_relative_eq!(pt0(1), 25.0);
        assert_relative_eq!(pt0(2), 0.0);
        assert_relative_eq!(pt0(3), 2.5);
        assert_relative_eq!(pt0(4), 2.5);
        assert!(meshes.features[0].get("future_2040_PTN").is_null());
        assert!(meshes.has_field("future_2040_PTE"));
    }

    #[test]
    fn change_columns_compare_consecutive_censuses() {
        let mut meshes = Layer::new(LAYER, GeometryKind::Polygon)
            .with_fields(&["2010_population", "2015_population", "2020_population", "future_2040_PT0"]);
        meshes.push(
            Feature::new(rect(0.0, 0.0, 1.0, 1.0))
                .with("2010_population", 100_i64)
                .with("2015_population", 110_i64)
                .with("2020_population", 99_i64)
                .with("future_2040_PT0", 80.4),
        );
        meshes.push(
            Feature::new(rect(0.0, 0.0, 1.0, 1.0))
                .with("2010_population", 0_i64)
                .with("2015_population", 5_i64)
                .with("2020_population", 10_i64),
        );

        derive_population_change(&mut meshes);

        let a = &meshes.features[0];
        assert_eq!(a.i64("population_diff_2015"), Some(10));
        assert_relative_eq!(a.f64("population_diff_rate_2015").unwrap(), 10.0);
        assert_relative_eq!(a.f64("population_diff_rate_2020").unwrap(), -10.0);
        assert_relative_eq!(a.f64("population_diff_rate_change_2020").unwrap(), -20.0);
        assert_eq!(a.i64("population_diff_future"), Some(-19));

        let b = &meshes.features[1];
        assert!(b.get("population_diff_rate_2015").is_null());
        assert_relative_eq!(b.f64("population_diff_rate_2020").unwrap(), 100.0);
        assert!(b.get("population_diff_rate_change_2020").is_null());
        assert!(b.get("population_diff_future").is_null());
    }

    fn write_meshes(input: &Path) {
        shapefile(
            input,
            &format!("{MESH_FOLDER}/mesh.shp"),
            ShapeType::Polygon,
            vec![rect(0.1, 0.1, 0.2, 0.2), rect(0.3, 0.3, 0.4, 0.4), rect(5.0, 5.0, 5.1, 5.1)],
            &[
                DbfField::text("KEY_CODE", 10),
                DbfField::text("MESH1_ID", 4),
                DbfField::text("MESH2_ID", 2),
                DbfField::text("MESH3_ID", 2),
                DbfField::text("MESH4_ID", 1),
                DbfField::text("MESH5_ID", 1),
            ],
            &[
                vec!["5339000011".into(), "5339".into(), "00".into(), "00".into(), "1".into(), "1".into()],
                vec!["5339000012".into(), "5339".into(), "00".into(), "00".into(), "1".into(), "2".into()],
                vec!["5339000021".into(), "5339".into(), "00".into(), "00".into(), "2".into(), "1".into()],
            ],
        );
    }

    #[test]
    fn meshes_carry_census_target_and_future_columns() {
        let dir = scratch_dir("population_ingest");
        let input = dir.join("input");
        write_meshes(&input);

        let census_dir = input.join(CENSUS_FOLDER).join("2020年");
        std::fs::create_dir_all(&census_dir).unwrap();
        std::fs::write(
            census_dir.join("tblT001142H5339.txt"),
            "KEY_CODE,HTKSYORI,T001142001,T001142002\n,,人口（総数）,男\n5339000011,0,300,140\n5339000012,0,*,*\n",
        )
        .unwrap();
        std::fs::write(
            input.join(TARGET_FILE),
            "comparative_year,target_population\n2040,250\n",
        )
        .unwrap();
        shapefile(
            &input,
            &format!("{FUTURE_FOLDER}/future.shp"),
            ShapeType::Polygon,
            vec![rect(0.1, 0.1, 0.4, 0.4)],
            &[DbfField::text("MESH_ID", 9), DbfField::numeric("PT0_2040", 10, 1)],
            &[vec!["533900001".into(), 240.0.into()]],
        );

        let mut store = store_in(&dir);
        seed_zones(&mut store);
        let report = PopulationIngestor.ingest(&IngestContext::new(&input), &mut store).unwrap();

        assert_eq!(report.layers, vec![TARGET_LAYER, FUTURE_LAYER, LAYER]);
        let meshes = store.load_layer(LAYER).unwrap();
        assert_eq!(meshes.len(), 2);
        let first = &meshes.features[0];
        assert_eq!(first.i64("2020_population"), Some(300));
        assert_relative_eq!(first.f64("2020_rank").unwrap(), 48.0);
        assert_relative_eq!(first.f64("future_2040_PT0").unwrap(), 240.0);
        assert_eq!(first.i64("population_diff_future"), Some(-60));
        let second = &meshes.features[1];
        assert_eq!(second.i64("2020_population"), Some(0));
        assert_relative_eq!(second.f64("future_2040_PT0").unwrap(), 0.0);

        let targets = store.load_layer(TARGET_LAYER).unwrap();
        assert_eq!(comparative_years(&targets).into_iter().collect::<Vec<_>>(), vec![Year(2040)]);

        drop(store);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_target_table_fails_the_domain() {
        let dir = scratch_dir("population_no_target");
        let input = dir.join("input");
        write_meshes(&input);
        let mut store = store_in(&dir);
        seed_zones(&mut store);

        let err = PopulationIngestor.ingest(&IngestContext::new(&input), &mut store).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MissingInput);
        assert!(err.to_string().ends_with("population_target_setting.csv was not found."));
        assert!(!store.contains(LAYER).unwrap());

        drop(store);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
