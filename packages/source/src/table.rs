//! Delimited text tables (CSV / census TXT) with encoding fallback.

use std::path::Path;

use crate::SourceError;
use crate::encoding::{DecodeOutcome, decode_with_fallback};

/// A decoded table: header plus string rows.
#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    /// Header names, trimmed.
    pub headers: Vec<String>,
    /// Data rows; short rows are not padded.
    pub rows: Vec<Vec<String>>,
    /// Whether the Shift_JIS fallback was needed.
    pub used_fallback: bool,
}

impl CsvTable {
    /// Index of the header `name`.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell `name` of `row`, trimmed; `None` when the column or cell is absent.
    #[must_use]
    pub fn cell<'a>(&self, row: &'a [String], name: &str) -> Option<&'a str> {
        self.column(name)
            .and_then(|i| row.get(i))
            .map(|s| s.trim())
    }
}

/// Reads a comma-separated file with a header row.
///
/// # Errors
///
/// * [`SourceError::Io`] if the file cannot be read
/// * [`SourceError::Encoding`] if it is neither UTF-8 nor Shift_JIS
/// * [`SourceError::Csv`] if the CSV structure is malformed
pub fn read_csv(path: &Path) -> Result<CsvTable, SourceError> {
    let bytes = std::fs::read(path).map_err(|e| SourceError::io(path, e))?;
    let (text, used_fallback) = match decode_with_fallback(&bytes) {
        DecodeOutcome::Primary(text) => {
            log::debug!(
                "{}: {}",
                plateau_stats_messages::tr(
                    plateau_stats_messages::Message::DetectedEncoding,
                    &[&"UTF-8"],
                ),
                path.display()
            );
            (text, false)
        }
        DecodeOutcome::Fallback(text) => {
            log::info!(
                "{}",
                plateau_stats_messages::tr(
                    plateau_stats_messages::Message::FallbackEncoding,
                    &[&"Shift_JIS", &path.display()],
                )
            );
            (text, true)
        }
        DecodeOutcome::Failed => {
            return Err(SourceError::Encoding {
                path: path.to_path_buf(),
            });
        }
    };

    let mut table = parse_csv(&text, path)?;
    table.used_fallback = used_fallback;
    Ok(table)
}

/// Parses already-decoded CSV text.
///
/// # Errors
///
/// * [`SourceError::Csv`] if the CSV structure is malformed
pub fn parse_csv(text: &str, path: &Path) -> Result<CsvTable, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let csv_err = |source| SourceError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let headers = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(CsvTable {
        headers,
        rows,
        used_fallback: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::scratch_dir;

    #[test]
    fn reads_shift_jis_csv() {
        let dir = scratch_dir("table_sjis");
        let path = dir.join("population_target_setting.csv");
        let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode("比較年度,目標人口\n2040,95000\n");
        std::fs::write(&path, &bytes).unwrap();

        let table = read_csv(&path).unwrap();
        assert!(table.used_fallback);
        assert_eq!(table.headers, vec!["比較年度", "目標人口"]);
        assert_eq!(table.cell(&table.rows[0], "目標人口"), Some("95000"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn short_rows_are_tolerated() {
        let table = parse_csv("a,b,c\n1,2\n", Path::new("x.csv")).unwrap();
        assert_eq!(table.rows[0].len(), 2);
        assert_eq!(table.cell(&table.rows[0], "c"), None);
    }
}
