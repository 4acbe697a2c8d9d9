//! Vacant house points per survey year (`vacancies`).

use plateau_stats_messages::{Message, tr};
use plateau_stats_models::{ErrorKind, Feature, GeometryKind, Layer};
use plateau_stats_source::discovery::{find_shapefiles, subdirectories};
use plateau_stats_store::SpatialContainerStore;

use crate::common::{load_shapefiles, push_checked, year_from_path};
use crate::{Domain, IngestContext, IngestError, IngestReport, Ingestor};

/// Output layer name.
pub const LAYER: &str = "vacancies";

/// Source folder; holds one `<YYYY>年` folder per survey.
pub const FOLDER: &str = "空き家ポイント";

/// Builds `vacancies` with only a `year` attribute per point.
pub struct VacancyIngestor;

impl Ingestor for VacancyIngestor {
    fn domain(&self) -> Domain {
        Domain::Vacancy
    }

    fn ingest(
        &self,
        ctx: &IngestContext,
        store: &mut SpatialContainerStore,
    ) -> Result<IngestReport, IngestError> {
        let root = ctx.path(FOLDER);
        let label = Domain::Vacancy.label();
        if find_shapefiles(&root).is_empty() {
            return Err(IngestError::ShapefileNotFound { label });
        }

        let mut report = IngestReport::default();
        let mut layer = Layer::new(LAYER, GeometryKind::Point).with_fields(&["year"]);

        for year_dir in subdirectories(&root) {
            let Some(year) = year_from_path(&root, &year_dir) else {
                report.skip(
                    year_dir.display(),
                    tr(Message::YearExtractionFailed, &[&year_dir.display()]),
                    ErrorKind::Format,
                );
                continue;
            };
            for data in load_shapefiles(&year_dir, &mut report) {
                let name = data.display_name();
                for (index, source) in data.features.into_iter().enumerate() {
                    let feature = Feature::new(source.geometry).with("year", year.as_i64());
                    push_checked(&mut layer, feature, &name, index, &mut report);
                }
            }
        }

        if layer.is_empty() {
            return Err(IngestError::NoValidShapefile { label });
        }
        report.write(store, &layer)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{rect, scratch_dir, shapefile, store_in};
    use geo::{Geometry, Point};
    use plateau_stats_models::Year;
    use plateau_stats_source::shp::ShapeType;
    use plateau_stats_source::write::DbfField;

    #[test]
    fn points_are_tagged_with_their_folder_year() {
        let dir = scratch_dir("vacancy_ingest");
        let input = dir.join("input");
        for (year, x) in [(2015, 0.2), (2020, 0.4)] {
            shapefile(
                &input,
                &format!("{FOLDER}/{year}年/points.shp"),
                ShapeType::Point,
                vec![Geometry::Point(Point::new(x, 0.5))],
                &[DbfField::text("NOTE", 10)],
                &[vec!["x".into()]],
            );
        }
        shapefile(
            &input,
            &format!("{FOLDER}/unknown/points.shp"),
            ShapeType::Point,
            vec![Geometry::Point(Point::new(0.9, 0.9))],
            &[DbfField::text("NOTE", 10)],
            &[vec!["x".into()]],
        );
        let mut store = store_in(&dir);

        let report = VacancyIngestor.ingest(&IngestContext::new(&input), &mut store).unwrap();

        let layer = store.load_layer(LAYER).unwrap();
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.fields, vec!["year"]);
        assert_eq!(
            layer.year_values("year").into_iter().collect::<Vec<_>>(),
            vec![Year(2015), Year(2020)]
        );
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].item.ends_with("unknown"));

        drop(store);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn year_comes_from_the_year_folder_not_the_input_root() {
        let dir = scratch_dir("vacancy_root_year");
        let input = dir.join("2019年度").join("input");
        shapefile(
            &input,
            &format!("{FOLDER}/2020年/points.shp"),
            ShapeType::Point,
            vec![Geometry::Point(Point::new(0.5, 0.5))],
            &[DbfField::text("NOTE", 10)],
            &[vec!["x".into()]],
        );
        let mut store = store_in(&dir);

        let report = VacancyIngestor.ingest(&IngestContext::new(&input), &mut store).unwrap();

        let layer = store.load_layer(LAYER).unwrap();
        assert_eq!(
            layer.year_values("year").into_iter().collect::<Vec<_>>(),
            vec![Year(2020)]
        );
        assert!(report.skipped.is_empty());

        drop(store);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn polygons_are_rejected_per_feature() {
        let dir = scratch_dir("vacancy_polygon");
        let input = dir.join("input");
        shapefile(
            &input,
            &format!("{FOLDER}/2020年/mixed.shp"),
            ShapeType::Polygon,
            vec![rect(0.0, 0.0, 0.1, 0.1)],
            &[DbfField::text("NOTE", 10)],
            &[vec!["x".into()]],
        );
        shapefile(
            &input,
            &format!("{FOLDER}/2020年/ok.shp"),
            ShapeType::Point,
            vec![Geometry::Point(Point::new(0.5, 0.5))],
            &[DbfField::text("NOTE", 10)],
            &[vec!["x".into()]],
        );
        let mut store = store_in(&dir);

        let report = VacancyIngestor.ingest(&IngestContext::new(&input), &mut store).unwrap();

        assert_eq!(store.load_layer(LAYER).unwrap().len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].kind, ErrorKind::Format);

        drop(store);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
