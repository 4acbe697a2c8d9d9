//! Published land prices (`land_prices`) and their per-mesh averages.

use std::collections::BTreeMap;

use plateau_stats_messages::{Message, label, tr};
use plateau_stats_models::{AttrValue, ErrorKind, Feature, GeometryKind, Layer, Year};
use plateau_stats_source::shapefile::ShapefileData;
use plateau_stats_spatial::PointIndex;
use plateau_stats_spatial::convert::as_multipolygon;
use plateau_stats_store::SpatialContainerStore;

use crate::common::{load_shapefiles, push_checked};
use crate::{Domain, IngestContext, IngestError, IngestReport, Ingestor, population};

/// Output layer name.
pub const LAYER: &str = "land_prices";

/// Source folder.
pub const FOLDER: &str = "地価公示";

/// Mesh field prefix of the yearly average price.
pub const AVERAGE_PREFIX: &str = "average_land_price_";
/// Mesh field prefix of the change against the previous average.
pub const DIFF_PREFIX: &str = "diff_land_price_";

const FIELDS: [&str; 9] = [
    "administrative_area_code",
    "usage_classification",
    "serial_number",
    "previous_year_administrative_area_code",
    "previous_year_usage_category",
    "previous_year_serial_number",
    "year",
    "public_land_price",
    "year_change_rate",
];

/// Column layout of a land price release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// 2024 and later: `L01_001..L01_009` map onto every output field.
    Full,
    /// Up to 2023: only the year (`L01_005`) and price (`L01_006`) are used.
    Legacy,
}

fn is_year(value: &AttrValue) -> bool {
    let text = value.to_string();
    let text = text.trim();
    text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit())
}

/// Detects the layout from the first record's year column.
fn layout(data: &ShapefileData) -> Option<Layout> {
    let first = data.features.first()?;
    if data.has_fields(&["L01_007"]) && is_year(first.get("L01_007")) {
        Some(Layout::Full)
    } else if data.has_fields(&["L01_005"]) && is_year(first.get("L01_005")) {
        Some(Layout::Legacy)
    } else {
        None
    }
}

fn land_price(source: &Feature, layout: Layout) -> Feature {
    let mut feature = Feature::new(source.geometry.clone());
    match layout {
        Layout::Full => {
            for (i, field) in FIELDS.iter().enumerate() {
                feature.set(field, source.get(&format!("L01_{:03}", i + 1)).clone());
            }
        }
        Layout::Legacy => {
            for field in FIELDS {
                feature.set(field, AttrValue::Null);
            }
            feature.set("year", source.get("L01_005").clone());
            feature.set("public_land_price", source.get("L01_006").clone());
        }
    }
    let year = feature.i64("year");
    feature.set("year", year);
    let price = feature.i64("public_land_price");
    feature.set("public_land_price", price);
    let rate = feature.f64("year_change_rate");
    feature.set("year_change_rate", rate);
    feature
}

/// Adds `average_land_price_{Y}` for every year and `diff_land_price_{Y}`
/// for every year after the first to each mesh.
///
/// A mesh without points in a year gets null for that year; a difference
/// needs both averages.
pub fn add_price_columns(meshes: &mut Layer, prices: &Layer) {
    let years: Vec<Year> = prices.year_values("year").into_iter().collect();
    for year in &years {
        meshes.ensure_field(&format!("{AVERAGE_PREFIX}{year}"));
    }
    for year in years.iter().skip(1) {
        meshes.ensure_field(&format!("{DIFF_PREFIX}{year}"));
    }

    let index = PointIndex::from_layer(prices);
    for mesh in &mut meshes.features {
        let inside = mesh
            .geometry
            .as_ref()
            .and_then(as_multipolygon)
            .map(|area| index.within(&area))
            .unwrap_or_default();

        let mut sums: BTreeMap<i64, (f64, u32)> = BTreeMap::new();
        for id in inside {
            let point = &prices.features[id];
            if let (Some(year), Some(price)) = (point.i64("year"), point.f64("public_land_price")) {
                let slot = sums.entry(year).or_default();
                slot.0 += price;
                slot.1 += 1;
            }
        }
        let average = |year: Year| {
            sums.get(&year.as_i64())
                .map(|(sum, count)| sum / f64::from(*count))
        };

        for year in &years {
            mesh.set(&format!("{AVERAGE_PREFIX}{year}"), average(*year));
        }
        for pair in years.windows(2) {
            let diff = average(pair[1]).zip(average(pair[0])).map(|(cur, prev)| cur - prev);
            mesh.set(&format!("{DIFF_PREFIX}{}", pair[1]), diff);
        }
    }
}

/// Builds `land_prices` and adds the price columns to `meshes`.
pub struct FinancialIngestor;

impl Ingestor for FinancialIngestor {
    fn domain(&self) -> Domain {
        Domain::Financial
    }

    fn ingest(
        &self,
        ctx: &IngestContext,
        store: &mut SpatialContainerStore,
    ) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::default();
        let mut layer = Layer::new(LAYER, GeometryKind::Point).with_fields(&FIELDS);
        let mut loaded = 0;

        for data in load_shapefiles(&ctx.path(FOLDER), &mut report) {
            let Some(layout) = layout(&data) else {
                let reason = tr(Message::YearFieldNotFound, &[&data.path.display()]);
                log::warn!("{reason}");
                report.skip(data.path.display(), reason, ErrorKind::Format);
                continue;
            };
            loaded += 1;
            let name = data.display_name();
            for (index, source) in data.features.iter().enumerate() {
                push_checked(&mut layer, land_price(source, layout), &name, index, &mut report);
            }
        }
        if loaded == 0 {
            return Err(IngestError::NoValidShapefile {
                label: label("land price"),
            });
        }

        let mut meshes = store.load_layer(population::LAYER)?;
        if layer.year_values("year").is_empty() {
            let reason = tr(Message::NoYearData, &[&label("land price layer")]);
            log::warn!("{reason}");
            report.skip(LAYER, reason, ErrorKind::MissingInput);
        } else {
            add_price_columns(&mut meshes, &layer);
            log::info!("{}", tr(Message::LandPriceAdded, &[]));
        }

        report.write(store, &layer)?;
        report.write(store, &meshes)?;
        Ok(report)
    }
}
