//! A Shapefile read together with its attribute table.

use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use plateau_stats_models::Feature;

use crate::SourceError;
use crate::dbf::read_dbf;
use crate::shp::{ShapeType, read_shp};

/// Geometry and attributes of one Shapefile.
#[derive(Debug, Clone)]
pub struct ShapefileData {
    /// The `.shp` path.
    pub path: PathBuf,
    /// Shape family from the header.
    pub shape_type: ShapeType,
    /// Attribute column names in file order.
    pub fields: Vec<String>,
    /// Features in record order, deleted rows removed.
    pub features: Vec<Feature>,
    /// Encoding of the attribute table.
    pub encoding: &'static Encoding,
    /// Whether the Shift_JIS fallback was needed.
    pub used_fallback: bool,
}

impl ShapefileData {
    /// Whether every one of `required` is a column.
    #[must_use]
    pub fn has_fields(&self, required: &[&str]) -> bool {
        required.iter().all(|r| self.fields.iter().any(|f| f == r))
    }

    /// File name for messages.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.path.file_name().map_or_else(
            || self.path.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        )
    }
}

/// Locates the `.dbf` sidecar of a `.shp`, accepting either case.
#[must_use]
pub fn sidecar_table(shp: &Path) -> Option<PathBuf> {
    ["dbf", "DBF"]
        .iter()
        .map(|ext| shp.with_extension(ext))
        .find(|p| p.is_file())
}

/// Reads a Shapefile and its DBF sidecar.
///
/// # Errors
///
/// * [`SourceError::MissingTable`] if there is no `.dbf` next to the `.shp`
/// * any error from [`read_shp`] or [`read_dbf`]
pub fn read_shapefile(path: &Path) -> Result<ShapefileData, SourceError> {
    let Some(table_path) = sidecar_table(path) else {
        return Err(SourceError::MissingTable {
            path: path.to_path_buf(),
        });
    };

    let shp = read_shp(path)?;
    let table = read_dbf(&table_path)?;

    if shp.shapes.len() != table.records.len() {
        log::warn!(
            "{}: {} shapes but {} attribute rows; extra records ignored",
            path.display(),
            shp.shapes.len(),
            table.records.len()
        );
    }

    let fields = table.field_names();
    let features = shp
        .shapes
        .into_iter()
        .zip(table.records)
        .filter(|(_, record)| !record.deleted)
        .map(|(geometry, record)| Feature {
            geometry,
            attributes: record.attributes,
        })
        .collect();

    log::debug!(
        "Read {} ({:?}, encoding {})",
        path.display(),
        shp.shape_type,
        table.encoding.name()
    );

    Ok(ShapefileData {
        path: path.to_path_buf(),
        shape_type: shp.shape_type,
        fields,
        features,
        encoding: table.encoding,
        used_fallback: table.used_fallback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::scratch_dir;
    use crate::write::{DbfField, write_shapefile};
    use encoding_rs::SHIFT_JIS;
    use geo::{Geometry, Point};
    use plateau_stats_models::AttrValue;

    #[test]
    fn reads_geometry_with_attributes() {
        let dir = scratch_dir("shapefile_read");
        let path = dir.join("stations.shp");
        write_shapefile(
            &path,
            ShapeType::Point,
            &[
                Some(Geometry::Point(Point::new(139.0, 35.0))),
                Some(Geometry::Point(Point::new(139.1, 35.1))),
            ],
            &[DbfField::text("N02_005", 20)],
            &[vec!["東京".into()], vec!["新宿".into()]],
            SHIFT_JIS,
        )
        .unwrap();

        let data = read_shapefile(&path).unwrap();
        assert_eq!(data.shape_type, ShapeType::Point);
        assert!(data.used_fallback);
        assert!(data.has_fields(&["N02_005"]));
        assert_eq!(data.features.len(), 2);
        assert_eq!(
            data.features[1].get("N02_005"),
            &AttrValue::Text("新宿".into())
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_dbf_fails_only_that_file() {
        let dir = scratch_dir("shapefile_missing_dbf");
        let good = dir.join("good.shp");
        let orphan = dir.join("orphan.shp");
        write_shapefile(
            &good,
            ShapeType::Point,
            &[Some(Geometry::Point(Point::new(1.0, 2.0)))],
            &[DbfField::text("NAME", 8)],
            &[vec!["a".into()]],
            encoding_rs::UTF_8,
        )
        .unwrap();
        std::fs::copy(&good, &orphan).unwrap();

        assert!(matches!(
            read_shapefile(&orphan),
            Err(SourceError::MissingTable { .. })
        ));
        assert_eq!(read_shapefile(&good).unwrap().features.len(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
