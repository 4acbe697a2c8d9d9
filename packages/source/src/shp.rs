//! ESRI `.shp` geometry records.
//!
//! Only the 2D part of each shape is read; Z and M arrays are skipped.

use std::path::Path;

use geo::{
    Contains, Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point,
    Polygon, Winding,
};
use plateau_stats_models::GeometryKind;

use crate::SourceError;

const FILE_CODE: i32 = 9994;
const HEADER_LEN: usize = 100;
const RECORD_HEADER_LEN: usize = 8;

/// Shape family of a Shapefile, with Z/M variants folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeType {
    /// Null shapes only.
    Null,
    /// Point, `PointZ`, `PointM`.
    Point,
    /// `PolyLine` and its Z/M variants.
    PolyLine,
    /// Polygon and its Z/M variants.
    Polygon,
    /// `MultiPoint` and its Z/M variants.
    MultiPoint,
}

impl ShapeType {
    /// Maps a header shape code; `None` for unsupported codes (e.g. `MultiPatch`).
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Null),
            1 | 11 | 21 => Some(Self::Point),
            3 | 13 | 23 => Some(Self::PolyLine),
            5 | 15 | 25 => Some(Self::Polygon),
            8 | 18 | 28 => Some(Self::MultiPoint),
            _ => None,
        }
    }

    /// The plain 2D code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Null => 0,
            Self::Point => 1,
            Self::PolyLine => 3,
            Self::Polygon => 5,
            Self::MultiPoint => 8,
        }
    }

    /// Layer geometry kind the shapes map onto.
    #[must_use]
    pub const fn geometry_kind(self) -> GeometryKind {
        match self {
            Self::Null => GeometryKind::None,
            Self::Point | Self::MultiPoint => GeometryKind::Point,
            Self::PolyLine => GeometryKind::LineString,
            Self::Polygon => GeometryKind::Polygon,
        }
    }
}

/// Parsed `.shp` content.
#[derive(Debug, Clone)]
pub struct ShpFile {
    /// Header shape type.
    pub shape_type: ShapeType,
    /// One entry per record; `None` for null shapes.
    pub shapes: Vec<Option<Geometry<f64>>>,
}

/// Reads a `.shp` file.
///
/// # Errors
///
/// * [`SourceError::Io`] if the file cannot be read
/// * [`SourceError::Format`] if the header or a record is malformed
/// * [`SourceError::UnsupportedShape`] for shape types other than points,
///   lines and polygons
pub fn read_shp(path: &Path) -> Result<ShpFile, SourceError> {
    let bytes = std::fs::read(path).map_err(|e| SourceError::io(path, e))?;
    parse_shp(&bytes, path)
}

/// Parses `.shp` bytes.
///
/// # Errors
///
/// See [`read_shp`].
pub fn parse_shp(bytes: &[u8], path: &Path) -> Result<ShpFile, SourceError> {
    if bytes.len() < HEADER_LEN {
        return Err(SourceError::format(path, "Shapefile header is truncated"));
    }
    if be_i32(bytes, 0) != FILE_CODE {
        return Err(SourceError::format(path, "bad Shapefile file code"));
    }

    let header_code = le_i32(bytes, 32);
    let shape_type = ShapeType::from_code(header_code).ok_or(SourceError::UnsupportedShape {
        path: path.to_path_buf(),
        shape_type: header_code,
    })?;

    let mut shapes = Vec::new();
    let mut offset = HEADER_LEN;
    while offset + RECORD_HEADER_LEN <= bytes.len() {
        let content_words = be_i32(bytes, offset + 4);
        let content_len = usize::try_from(content_words)
            .map_err(|_| SourceError::format(path, "negative record length"))?
            * 2;
        let start = offset + RECORD_HEADER_LEN;
        let end = start + content_len;
        if end > bytes.len() {
            return Err(SourceError::format(path, "record extends past end of file"));
        }
        shapes.push(parse_record(&bytes[start..end], path)?);
        offset = end;
    }

    Ok(ShpFile { shape_type, shapes })
}

fn parse_record(content: &[u8], path: &Path) -> Result<Option<Geometry<f64>>, SourceError> {
    if content.len() < 4 {
        return Err(SourceError::format(path, "record is missing its shape type"));
    }
    let code = le_i32(content, 0);
    let Some(shape_type) = ShapeType::from_code(code) else {
        return Err(SourceError::UnsupportedShape {
            path: path.to_path_buf(),
            shape_type: code,
        });
    };

    let reader = Reader { content, path };
    let geometry = match shape_type {
        ShapeType::Null => return Ok(None),
        ShapeType::Point => Geometry::Point(Point::from(reader.coord(4)?)),
        ShapeType::MultiPoint => {
            let count = reader.count(36)?;
            let points = (0..count)
                .map(|i| reader.coord(40 + i * 16).map(Point::from))
                .collect::<Result<Vec<_>, _>>()?;
            Geometry::MultiPoint(MultiPoint::new(points))
        }
        ShapeType::PolyLine => {
            let parts = reader.parts()?;
            let mut lines: Vec<LineString<f64>> = parts.into_iter().map(LineString::new).collect();
            if lines.len() == 1 {
                Geometry::LineString(lines.remove(0))
            } else {
                Geometry::MultiLineString(MultiLineString::new(lines))
            }
        }
        ShapeType::Polygon => assemble_polygon(reader.parts()?),
    };

    Ok(Some(geometry))
}

struct Reader<'a> {
    content: &'a [u8],
    path: &'a Path,
}

impl Reader<'_> {
    fn need(&self, end: usize) -> Result<(), SourceError> {
        if end > self.content.len() {
            Err(SourceError::format(self.path, "record content is truncated"))
        } else {
            Ok(())
        }
    }

    fn count(&self, at: usize) -> Result<usize, SourceError> {
        self.need(at + 4)?;
        usize::try_from(le_i32(self.content, at))
            .map_err(|_| SourceError::format(self.path, "negative element count"))
    }

    fn coord(&self, at: usize) -> Result<Coord<f64>, SourceError> {
        self.need(at + 16)?;
        Ok(Coord {
            x: le_f64(self.content, at),
            y: le_f64(self.content, at + 8),
        })
    }

    /// Reads the part/point arrays shared by `PolyLine` and Polygon.
    fn parts(&self) -> Result<Vec<Vec<Coord<f64>>>, SourceError> {
        let num_parts = self.count(36)?;
        let num_points = self.count(40)?;
        let parts_at = 44;
        let points_at = parts_at + num_parts * 4;
        self.need(points_at + num_points * 16)?;

        let mut starts = (0..num_parts)
            .map(|i| {
                usize::try_from(le_i32(self.content, parts_at + i * 4))
                    .map_err(|_| SourceError::format(self.path, "negative part index"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        starts.push(num_points);

        let mut parts = Vec::with_capacity(num_parts);
        for window in starts.windows(2) {
            let (from, to) = (window[0], window[1]);
            if from > to || to > num_points {
                return Err(SourceError::format(self.path, "part index out of range"));
            }
            let ring = (from..to)
                .map(|i| self.coord(points_at + i * 16))
                .collect::<Result<Vec<_>, _>>()?;
            parts.push(ring);
        }
        Ok(parts)
    }
}

/// Groups rings into polygons: clockwise rings are exteriors, the others are
/// holes of the exterior containing them.
fn assemble_polygon(rings: Vec<Vec<Coord<f64>>>) -> Geometry<f64> {
    let mut exteriors: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();
    let mut holes: Vec<LineString<f64>> = Vec::new();

    for ring in rings {
        let mut line = LineString::new(ring);
        line.close();
        if line.is_ccw() {
            holes.push(line);
        } else {
            exteriors.push((line, Vec::new()));
        }
    }

    for hole in holes {
        let Some(sample) = hole.0.first().copied() else {
            continue;
        };
        let owner = exteriors
            .iter_mut()
            .find(|(shell, _)| Polygon::new(shell.clone(), Vec::new()).contains(&sample));
        match owner {
            Some((_, interiors)) => interiors.push(hole),
            None => {
                // Orphan hole: publishers sometimes get the winding wrong.
                let mut shell = hole;
                shell.make_cw_winding();
                exteriors.push((shell, Vec::new()));
            }
        }
    }

    let mut polygons: Vec<Polygon<f64>> = exteriors
        .into_iter()
        .map(|(shell, interiors)| Polygon::new(shell, interiors))
        .collect();

    if polygons.len() == 1 {
        Geometry::Polygon(polygons.remove(0))
    } else {
        Geometry::MultiPolygon(MultiPolygon::new(polygons))
    }
}

fn be_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn le_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn le_f64(bytes: &[u8], at: usize) -> f64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    f64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::encode_shp;
    use geo::{coord, line_string, polygon};

    #[test]
    fn parses_points_and_null_shapes() {
        let shapes = vec![Some(Geometry::Point(Point::new(139.7, 35.6))), None];
        let bytes = encode_shp(ShapeType::Point, &shapes);
        let shp = parse_shp(&bytes, Path::new("p.shp")).unwrap();

        assert_eq!(shp.shape_type, ShapeType::Point);
        assert_eq!(shp.shapes, shapes);
    }

    #[test]
    fn single_part_polyline_is_linestring() {
        let line = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0), (x: 2.0, y: 1.0)];
        let bytes = encode_shp(ShapeType::PolyLine, &[Some(Geometry::LineString(line.clone()))]);
        let shp = parse_shp(&bytes, Path::new("l.shp")).unwrap();
        assert_eq!(shp.shapes[0], Some(Geometry::LineString(line)));
    }

    #[test]
    fn polygon_holes_attach_to_containing_shell() {
        // Shell clockwise, hole counter-clockwise, as the format requires.
        let shell = vec![
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 0.0, y: 10.0 },
            coord! { x: 10.0, y: 10.0 },
            coord! { x: 10.0, y: 0.0 },
            coord! { x: 0.0, y: 0.0 },
        ];
        let hole = vec![
            coord! { x: 2.0, y: 2.0 },
            coord! { x: 4.0, y: 2.0 },
            coord! { x: 4.0, y: 4.0 },
            coord! { x: 2.0, y: 4.0 },
            coord! { x: 2.0, y: 2.0 },
        ];
        let other = vec![
            coord! { x: 20.0, y: 0.0 },
            coord! { x: 20.0, y: 1.0 },
            coord! { x: 21.0, y: 1.0 },
            coord! { x: 20.0, y: 0.0 },
        ];

        let geometry = assemble_polygon(vec![shell, hole, other]);
        let Geometry::MultiPolygon(mp) = geometry else {
            panic!("expected multipolygon, got {geometry:?}");
        };
        assert_eq!(mp.0.len(), 2);
        assert_eq!(mp.0[0].interiors().len(), 1);
        assert!(mp.0[1].interiors().is_empty());
    }

    #[test]
    fn polygon_round_trips_through_writer() {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 0.0, y: 1.0),
            (x: 1.0, y: 1.0),
            (x: 1.0, y: 0.0),
            (x: 0.0, y: 0.0),
        ];
        let bytes = encode_shp(ShapeType::Polygon, &[Some(Geometry::Polygon(poly))]);
        let shp = parse_shp(&bytes, Path::new("a.shp")).unwrap();
        let Some(Geometry::Polygon(read)) = &shp.shapes[0] else {
            panic!("expected polygon");
        };
        assert_eq!(read.exterior().0.len(), 5);
        assert!(read.interiors().is_empty());
    }

    #[test]
    fn multipatch_is_unsupported() {
        let mut bytes = encode_shp(ShapeType::Point, &[]);
        bytes[32..36].copy_from_slice(&31i32.to_le_bytes());
        let err = parse_shp(&bytes, Path::new("m.shp")).unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedShape { shape_type: 31, .. }));
    }

    #[test]
    fn bad_file_code_is_format_error() {
        let bytes = vec![0u8; 100];
        assert!(matches!(
            parse_shp(&bytes, Path::new("x.shp")),
            Err(SourceError::Format { .. })
        ));
    }
}
