//! Minimal Shapefile/DBF writer.
//!
//! Supports exactly what [`crate::shp`] and [`crate::dbf`] read: 2D points,
//! lines and polygons with text and numeric columns.

use std::path::Path;

use encoding_rs::Encoding;
use geo::{BoundingRect, Coord, Geometry, LineString, Polygon, Winding};
use plateau_stats_models::AttrValue;

use crate::SourceError;
use crate::dbf::FieldType;
use crate::shp::ShapeType;

/// Column definition for [`encode_dbf`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbfField {
    /// Column name (truncated to 10 bytes once encoded).
    pub name: String,
    /// Type code.
    pub field_type: FieldType,
    /// Width in bytes.
    pub length: u8,
    /// Decimal places.
    pub decimals: u8,
}

impl DbfField {
    /// A `C` column.
    #[must_use]
    pub fn text(name: &str, length: u8) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::Character,
            length,
            decimals: 0,
        }
    }

    /// An `N` column.
    #[must_use]
    pub fn numeric(name: &str, length: u8, decimals: u8) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::Numeric,
            length,
            decimals,
        }
    }
}

/// Writes `<path>.shp` and `<path>.dbf`.
///
/// # Errors
///
/// * [`SourceError::Io`] if either file cannot be written
pub fn write_shapefile(
    path: &Path,
    shape_type: ShapeType,
    shapes: &[Option<Geometry<f64>>],
    fields: &[DbfField],
    rows: &[Vec<AttrValue>],
    encoding: &'static Encoding,
) -> Result<(), SourceError> {
    let shp = path.with_extension("shp");
    std::fs::write(&shp, encode_shp(shape_type, shapes)).map_err(|e| SourceError::io(&shp, e))?;
    let dbf = path.with_extension("dbf");
    std::fs::write(&dbf, encode_dbf(fields, rows, encoding))
        .map_err(|e| SourceError::io(&dbf, e))?;
    Ok(())
}

/// Encodes a dBase III table. Missing trailing values in a row are written
/// as blanks.
#[must_use]
pub fn encode_dbf(
    fields: &[DbfField],
    rows: &[Vec<AttrValue>],
    encoding: &'static Encoding,
) -> Vec<u8> {
    let header_len = 32 + 32 * fields.len() + 1;
    let record_len = 1 + fields.iter().map(|f| usize::from(f.length)).sum::<usize>();

    let mut out = Vec::with_capacity(header_len + record_len * rows.len() + 1);
    out.push(0x03);
    out.extend_from_slice(&[124, 1, 1]);
    out.extend_from_slice(&u32::try_from(rows.len()).unwrap_or(u32::MAX).to_le_bytes());
    out.extend_from_slice(&u16::try_from(header_len).unwrap_or(u16::MAX).to_le_bytes());
    out.extend_from_slice(&u16::try_from(record_len).unwrap_or(u16::MAX).to_le_bytes());
    out.resize(32, 0);

    for field in fields {
        let (name, _, _) = encoding.encode(&field.name);
        let mut descriptor = [0u8; 32];
        let n = name.len().min(10);
        descriptor[..n].copy_from_slice(&name[..n]);
        descriptor[11] = field.field_type.code();
        descriptor[16] = field.length;
        descriptor[17] = field.decimals;
        out.extend_from_slice(&descriptor);
    }
    out.push(0x0D);

    for row in rows {
        out.push(b' ');
        for (i, field) in fields.iter().enumerate() {
            let width = usize::from(field.length);
            let value = row.get(i).unwrap_or(&AttrValue::Null);
            let mut cell = match field.field_type {
                FieldType::Numeric | FieldType::Float => {
                    let text = match value {
                        AttrValue::Null => String::new(),
                        AttrValue::Real(v) => format!("{v:.prec$}", prec = usize::from(field.decimals)),
                        other => other.to_string(),
                    };
                    format!("{text:>width$}").into_bytes()
                }
                _ => {
                    let text = value.to_string();
                    let (bytes, _, _) = encoding.encode(&text);
                    let mut bytes = bytes.into_owned();
                    bytes.resize(width.max(bytes.len()), b' ');
                    bytes
                }
            };
            cell.truncate(width);
            cell.resize(width, b' ');
            out.extend_from_slice(&cell);
        }
    }
    out.push(0x1A);
    out
}

/// Encodes a `.shp` file of one shape family.
#[must_use]
pub fn encode_shp(shape_type: ShapeType, shapes: &[Option<Geometry<f64>>]) -> Vec<u8> {
    let mut records = Vec::new();
    let mut bounds: Option<[f64; 4]> = None;

    for (i, shape) in shapes.iter().enumerate() {
        let content = shape.as_ref().map_or_else(|| 0i32.to_le_bytes().to_vec(), |g| {
            if let Some(rect) = g.bounding_rect() {
                let b = bounds.get_or_insert([rect.min().x, rect.min().y, rect.max().x, rect.max().y]);
                b[0] = b[0].min(rect.min().x);
                b[1] = b[1].min(rect.min().y);
                b[2] = b[2].max(rect.max().x);
                b[3] = b[3].max(rect.max().y);
            }
            encode_geometry(g)
        });
        records.extend_from_slice(&i32::try_from(i + 1).unwrap_or(i32::MAX).to_be_bytes());
        records.extend_from_slice(&words(content.len()).to_be_bytes());
        records.extend_from_slice(&content);
    }

    let mut out = Vec::with_capacity(100 + records.len());
    out.extend_from_slice(&9994i32.to_be_bytes());
    out.resize(24, 0);
    out.extend_from_slice(&words(100 + records.len()).to_be_bytes());
    out.extend_from_slice(&1000i32.to_le_bytes());
    out.extend_from_slice(&shape_type.code().to_le_bytes());
    for v in bounds.unwrap_or([0.0; 4]) {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.resize(100, 0);
    out.extend_from_slice(&records);
    out
}

fn words(len: usize) -> i32 {
    i32::try_from(len / 2).unwrap_or(i32::MAX)
}

fn encode_geometry(geometry: &Geometry<f64>) -> Vec<u8> {
    match geometry {
        Geometry::Point(p) => {
            let mut out = 1i32.to_le_bytes().to_vec();
            push_coord(&mut out, p.0);
            out
        }
        Geometry::MultiPoint(mp) => {
            let coords: Vec<Coord<f64>> = mp.iter().map(|p| p.0).collect();
            let mut out = 8i32.to_le_bytes().to_vec();
            push_bbox(&mut out, geometry);
            push_count(&mut out, coords.len());
            for c in coords {
                push_coord(&mut out, c);
            }
            out
        }
        Geometry::LineString(ls) => encode_parts(3, geometry, &[ls.clone()]),
        Geometry::MultiLineString(mls) => encode_parts(3, geometry, &mls.0),
        Geometry::Polygon(p) => encode_parts(5, geometry, &polygon_rings(p)),
        Geometry::MultiPolygon(mp) => {
            let rings: Vec<LineString<f64>> = mp.iter().flat_map(polygon_rings).collect();
            encode_parts(5, geometry, &rings)
        }
        _ => 0i32.to_le_bytes().to_vec(),
    }
}

fn polygon_rings(polygon: &Polygon<f64>) -> Vec<LineString<f64>> {
    let mut shell = polygon.exterior().clone();
    shell.make_cw_winding();
    let mut rings = vec![shell];
    for hole in polygon.interiors() {
        let mut hole = hole.clone();
        hole.make_ccw_winding();
        rings.push(hole);
    }
    rings
}

fn encode_parts(code: i32, geometry: &Geometry<f64>, parts: &[LineString<f64>]) -> Vec<u8> {
    let mut out = code.to_le_bytes().to_vec();
    push_bbox(&mut out, geometry);
    push_count(&mut out, parts.len());
    push_count(&mut out, parts.iter().map(|p| p.0.len()).sum());
    let mut start = 0;
    for part in parts {
        push_count(&mut out, start);
        start += part.0.len();
    }
    for part in parts {
        for c in &part.0 {
            push_coord(&mut out, *c);
        }
    }
    out
}

fn push_bbox(out: &mut Vec<u8>, geometry: &Geometry<f64>) {
    let rect = geometry.bounding_rect();
    let values = rect.map_or([0.0; 4], |r| [r.min().x, r.min().y, r.max().x, r.max().y]);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn push_count(out: &mut Vec<u8>, n: usize) {
    out.extend_from_slice(&i32::try_from(n).unwrap_or(i32::MAX).to_le_bytes());
}

fn push_coord(out: &mut Vec<u8>, c: Coord<f64>) {
    out.extend_from_slice(&c.x.to_le_bytes());
    out.extend_from_slice(&c.y.to_le_bytes());
}
