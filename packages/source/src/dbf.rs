//! dBase III attribute tables (the `.dbf` sidecar of a Shapefile).

use std::path::Path;

use encoding_rs::{Encoding, SHIFT_JIS, UTF_8};
use plateau_stats_models::{AttrValue, Attributes};

use crate::SourceError;
use crate::encoding::{decode_strict, detect, encoding_from_cpg};

const HEADER_LEN: usize = 32;
const DESCRIPTOR_LEN: usize = 32;
const DESCRIPTOR_END: u8 = 0x0D;
const DELETED: u8 = b'*';

/// dBase field type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// `C`: fixed-width text.
    Character,
    /// `N`: fixed-point number stored as text.
    Numeric,
    /// `F`: floating point number stored as text.
    Float,
    /// `L`: logical.
    Logical,
    /// `D`: `YYYYMMDD` date.
    Date,
    /// Anything else, read as text.
    Other(u8),
}

impl FieldType {
    /// Maps a type byte.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            b'C' | b'c' => Self::Character,
            b'N' | b'n' => Self::Numeric,
            b'F' | b'f' => Self::Float,
            b'L' | b'l' => Self::Logical,
            b'D' | b'd' => Self::Date,
            other => Self::Other(other),
        }
    }

    /// The type byte.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Character => b'C',
            Self::Numeric => b'N',
            Self::Float => b'F',
            Self::Logical => b'L',
            Self::Date => b'D',
            Self::Other(c) => c,
        }
    }
}

/// One column of a DBF table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Decoded column name.
    pub name: String,
    /// Type code.
    pub field_type: FieldType,
    /// Width in bytes.
    pub length: usize,
    /// Decimal places for numeric fields.
    pub decimals: u8,
}

/// One row of a DBF table.
#[derive(Debug, Clone, PartialEq)]
pub struct DbfRecord {
    /// Whether the row carries the deletion flag.
    pub deleted: bool,
    /// Decoded values keyed by column name.
    pub attributes: Attributes,
}

/// A fully decoded DBF table.
#[derive(Debug, Clone)]
pub struct DbfTable {
    /// Columns in file order.
    pub fields: Vec<FieldDescriptor>,
    /// Rows in file order, deleted rows included so indices match the
    /// geometry records.
    pub records: Vec<DbfRecord>,
    /// Encoding the text was decoded with.
    pub encoding: &'static Encoding,
    /// Whether the Shift_JIS fallback was needed.
    pub used_fallback: bool,
}

impl DbfTable {
    /// Column names in file order.
    #[must_use]
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

/// Reads and decodes a `.dbf` file.
///
/// A `.cpg` sidecar names the code page; otherwise the text is decoded as
/// UTF-8 with a Shift_JIS fallback.
///
/// # Errors
///
/// * [`SourceError::Io`] if the file cannot be read
/// * [`SourceError::Format`] if the header or records are truncated
/// * [`SourceError::Encoding`] if the text is neither UTF-8 nor Shift_JIS
pub fn read_dbf(path: &Path) -> Result<DbfTable, SourceError> {
    let bytes = std::fs::read(path).map_err(|e| SourceError::io(path, e))?;
    parse_dbf(&bytes, path, encoding_from_cpg(path))
}

/// Decodes DBF bytes. `forced` skips detection.
///
/// # Errors
///
/// See [`read_dbf`].
pub fn parse_dbf(
    bytes: &[u8],
    path: &Path,
    forced: Option<&'static Encoding>,
) -> Result<DbfTable, SourceError> {
    if bytes.len() < HEADER_LEN {
        return Err(SourceError::format(path, "DBF header is truncated"));
    }

    let record_count = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let header_len = usize::from(u16::from_le_bytes([bytes[8], bytes[9]]));
    let record_len = usize::from(u16::from_le_bytes([bytes[10], bytes[11]]));

    if header_len > bytes.len() || header_len < HEADER_LEN + 1 {
        return Err(SourceError::format(path, "DBF header length is out of range"));
    }

    let raw_fields = read_descriptors(&bytes[HEADER_LEN..header_len]);
    let expected = 1 + raw_fields.iter().map(|f| f.length).sum::<usize>();
    if record_len < expected {
        return Err(SourceError::format(
            path,
            format!("record length {record_len} is shorter than the fields ({expected})"),
        ));
    }

    let body = &bytes[header_len..];
    let available = body.len() / record_len.max(1);
    if available < record_count {
        log::warn!(
            "{} declares {record_count} records but only {available} are present",
            path.display()
        );
    }
    let rows: Vec<&[u8]> = body
        .chunks_exact(record_len.max(1))
        .take(record_count.min(available))
        .collect();

    let (encoding, used_fallback) = match forced {
        Some(encoding) => (encoding, false),
        None => choose_encoding(&raw_fields, &rows, path)?,
    };

    let fields = raw_fields
        .iter()
        .map(|raw| {
            let name = decode_strict(trim_name(raw.name), encoding)
                .ok_or_else(|| SourceError::Encoding {
                    path: path.to_path_buf(),
                })?;
            Ok(FieldDescriptor {
                name: name.trim().to_string(),
                field_type: raw.field_type,
                length: raw.length,
                decimals: raw.decimals,
            })
        })
        .collect::<Result<Vec<_>, SourceError>>()?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let mut attributes = Attributes::new();
        let mut offset = 1;
        for field in &fields {
            let raw = &row[offset..offset + field.length];
            offset += field.length;
            attributes.insert(field.name.clone(), parse_value(raw, field, encoding));
        }
        records.push(DbfRecord {
            deleted: row[0] == DELETED,
            attributes,
        });
    }

    Ok(DbfTable {
        fields,
        records,
        encoding,
        used_fallback,
    })
}

struct RawDescriptor<'a> {
    name: &'a [u8],
    field_type: FieldType,
    length: usize,
    decimals: u8,
}

fn read_descriptors(area: &[u8]) -> Vec<RawDescriptor<'_>> {
    area.chunks_exact(DESCRIPTOR_LEN)
        .take_while(|d| d[0] != DESCRIPTOR_END)
        .map(|d| RawDescriptor {
            name: &d[..11],
            field_type: FieldType::from_code(d[11]),
            length: usize::from(d[16]),
            decimals: d[17],
        })
        .collect()
}

fn trim_name(name: &[u8]) -> &[u8] {
    let end = name.iter().position(|b| *b == 0).unwrap_or(name.len());
    &name[..end]
}

/// Picks one encoding for the whole table from the names and text columns.
fn choose_encoding(
    fields: &[RawDescriptor<'_>],
    rows: &[&[u8]],
    path: &Path,
) -> Result<(&'static Encoding, bool), SourceError> {
    let mut sample = Vec::new();
    for field in fields {
        sample.extend_from_slice(trim_name(field.name));
        sample.push(b' ');
    }
    for row in rows {
        let mut offset = 1;
        for field in fields {
            if matches!(field.field_type, FieldType::Character) {
                sample.extend_from_slice(trim_padding(&row[offset..offset + field.length]));
                sample.push(b' ');
            }
            offset += field.length;
        }
    }

    match detect(&sample) {
        Some(encoding) if encoding == UTF_8 => {
            log::debug!(
                "{}: {}",
                plateau_stats_messages::tr(
                    plateau_stats_messages::Message::DetectedEncoding,
                    &[&encoding.name()],
                ),
                path.display()
            );
            Ok((UTF_8, false))
        }
        Some(encoding) => {
            log::info!(
                "{}",
                plateau_stats_messages::tr(
                    plateau_stats_messages::Message::FallbackEncoding,
                    &[&encoding.name(), &path.display()],
                )
            );
            Ok((encoding, encoding == SHIFT_JIS))
        }
        None => Err(SourceError::Encoding {
            path: path.to_path_buf(),
        }),
    }
}

fn trim_padding(raw: &[u8]) -> &[u8] {
    let end = raw
        .iter()
        .rposition(|b| *b != b' ' && *b != 0)
        .map_or(0, |i| i + 1);
    &raw[..end]
}

fn parse_value(raw: &[u8], field: &FieldDescriptor, encoding: &'static Encoding) -> AttrValue {
    let raw = trim_padding(raw);
    if raw.is_empty() {
        return AttrValue::Null;
    }

    match field.field_type {
        FieldType::Numeric | FieldType::Float => {
            let text = String::from_utf8_lossy(raw);
            let text = text.trim();
            if text.chars().all(|c| c == '*') {
                return AttrValue::Null;
            }
            if field.decimals == 0
                && let Ok(v) = text.parse::<i64>()
            {
                return AttrValue::Int(v);
            }
            text.parse::<f64>().map_or(AttrValue::Null, AttrValue::from)
        }
        FieldType::Logical => match raw[0] {
            b'T' | b't' | b'Y' | b'y' => AttrValue::Int(1),
            b'F' | b'f' | b'N' | b'n' => AttrValue::Int(0),
            _ => AttrValue::Null,
        },
        FieldType::Date => {
            let text = String::from_utf8_lossy(raw);
            let text = text.trim();
            if text.len() == 8 && text.bytes().all(|b| b.is_ascii_digit()) {
                AttrValue::Text(format!("{}-{}-{}", &text[..4], &text[4..6], &text[6..]))
            } else {
                AttrValue::Text(text.to_string())
            }
        }
        FieldType::Character | FieldType::Other(_) => {
            let (text, _) = encoding.decode_without_bom_handling(raw);
            let text = text.trim();
            if text.is_empty() {
                AttrValue::Null
            } else {
                AttrValue::Text(text.to_string())
            }
        }
    }
}
