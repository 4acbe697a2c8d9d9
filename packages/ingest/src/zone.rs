//! Administrative zone polygons (`zones`).

use plateau_stats_models::{GeometryKind, Layer};
use plateau_stats_store::SpatialContainerStore;

use crate::common::{FieldMap, map_feature, output_fields, push_checked, repair_logged, require_shapefiles};
use crate::{Domain, IngestContext, IngestError, IngestReport, Ingestor};

/// Output layer name.
pub const LAYER: &str = "zones";

/// Source folder under the input root.
pub const FOLDER: &str = "ゾーンポリゴン";

const FIELDS: FieldMap = &[("KEY_CODE", "key_code"), ("PREF", "pref"), ("CITY", "city")];

/// Builds `zones` from every zone Shapefile.
pub struct ZoneIngestor;

impl Ingestor for ZoneIngestor {
    fn domain(&self) -> Domain {
        Domain::Zone
    }

    fn ingest(
        &self,
        ctx: &IngestContext,
        store: &mut SpatialContainerStore,
    ) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::default();
        let sources = require_shapefiles(&ctx.path(FOLDER), &Domain::Zone.label(), &mut report)?;

        let mut layer = Layer::new(LAYER, GeometryKind::Polygon).with_fields(&output_fields(FIELDS));
        for data in &sources {
            let name = data.display_name();
            for (index, feature) in data.features.iter().enumerate() {
                push_checked(&mut layer, map_feature(feature, FIELDS), &name, index, &mut report);
            }
        }

        repair_logged(&mut layer, &mut report);
        report.write(store, &layer)?;
        Ok(report)
    }
}
