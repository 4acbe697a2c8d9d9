//! Urban facility points (`facilities`).

use geo::{Centroid, Geometry};
use plateau_stats_messages::{Message, tr};
use plateau_stats_models::{ErrorKind, Feature, GeometryKind, Layer};
use plateau_stats_source::discovery::find_shapefiles;
use plateau_stats_store::SpatialContainerStore;

use crate::common::{load_shapefiles, push_checked, year_from_path};
use crate::{Domain, IngestContext, IngestError, IngestReport, Ingestor, building};

/// Output layer name.
pub const LAYER: &str = "facilities";

/// Parent folder of the per-kind facility folders.
pub const FOLDER: &str = "施設";

/// Building `usage` that marks a commercial facility.
pub const COMMERCIAL_USAGE: &str = "商業施設";

/// Facility type codes.
pub mod kind {
    /// Administrative office.
    pub const ADMINISTRATIVE: i64 = 1;
    /// Commercial building.
    pub const COMMERCIAL: i64 = 2;
    /// Medical facility.
    pub const MEDICAL: i64 = 3;
    /// Childcare facility.
    pub const CHILDCARE: i64 = 4;
    /// Welfare facility.
    pub const WELFARE: i64 = 5;
    /// School.
    pub const SCHOOL: i64 = 6;
    /// Cultural facility.
    pub const CULTURAL: i64 = 7;
}

struct Source {
    folder: &'static str,
    type_code: i64,
    name_field: &'static str,
    address_field: &'static str,
}

const SOURCES: [Source; 5] = [
    Source {
        folder: "行政施設ポイント",
        type_code: kind::ADMINISTRATIVE,
        name_field: "P05_003",
        address_field: "P05_004",
    },
    Source {
        folder: "医療施設ポイント",
        type_code: kind::MEDICAL,
        name_field: "P04_002",
        address_field: "P04_003",
    },
    Source {
        folder: "福祉施設ポイント",
        type_code: kind::WELFARE,
        name_field: "P14_008",
        address_field: "P14_004",
    },
    Source {
        folder: "学校ポイント",
        type_code: kind::SCHOOL,
        name_field: "P29_004",
        address_field: "P29_005",
    },
    Source {
        folder: "文化施設ポイント",
        type_code: kind::CULTURAL,
        name_field: "P27_005",
        address_field: "P27_006",
    },
];

/// Welfare category codes 05 and 06 are childcare.
fn welfare_type(feature: &Feature) -> i64 {
    match feature.i64("P14_005") {
        Some(5 | 6) => kind::CHILDCARE,
        _ => kind::WELFARE,
    }
}

/// Builds `facilities` from the facility folders plus commercial buildings.
pub struct FacilityIngestor;

impl Ingestor for FacilityIngestor {
    fn domain(&self) -> Domain {
        Domain::Facility
    }

    fn ingest(
        &self,
        ctx: &IngestContext,
        store: &mut SpatialContainerStore,
    ) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::default();
        let mut layer =
            Layer::new(LAYER, GeometryKind::Point).with_fields(&["year", "name", "type", "address"]);

        for source in &SOURCES {
            let folder = ctx.path(FOLDER).join(source.folder);
            if find_shapefiles(&folder).is_empty() {
                let reason = tr(Message::ShapefileNotFound, &[&source.folder]);
                log::warn!("{reason}");
                report.skip(folder.display(), reason, ErrorKind::MissingInput);
                continue;
            }
            for data in load_shapefiles(&folder, &mut report) {
                let year = year_from_path(&folder, &data.path);
                let name = data.display_name();
                for (index, source_feature) in data.features.iter().enumerate() {
                    let type_code = if source.type_code == kind::WELFARE {
                        welfare_type(source_feature)
                    } else {
                        source.type_code
                    };
                    let feature = Feature::new(source_feature.geometry.clone())
                        .with("year", year.map(|y| y.as_i64()))
                        .with("name", source_feature.get(source.name_field).clone())
                        .with("type", type_code)
                        .with("address", source_feature.get(source.address_field).clone());
                    push_checked(&mut layer, feature, &name, index, &mut report);
                }
            }
        }

        let buildings = store.load_layer(building::LAYER)?;
        let before = layer.len();
        for building in &buildings.features {
            if building.text("usage") != COMMERCIAL_USAGE {
                continue;
            }
            let Some(centroid) = building.geometry.as_ref().and_then(Centroid::centroid) else {
                continue;
            };
            layer.push(
                Feature::new(Geometry::Point(centroid))
                    .with("year", None::<i64>)
                    .with("name", None::<String>)
                    .with("type", kind::COMMERCIAL)
                    .with("address", building.get("address").clone()),
            );
        }
        log::debug!("Added {} commercial buildings as facilities", layer.len() - before);

        report.write(store, &layer)?;
        Ok(report)
    }
}
