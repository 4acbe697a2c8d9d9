//! CSV output of metric tables.

use std::path::{Path, PathBuf};

use plateau_stats_messages::{Message, tr};
use plateau_stats_models::{MetricTable, MetricValue};

use crate::MetricError;

/// Writes `table` to `dir/<file_name>` with a `Year` column followed by the
/// table's columns in order. Missing cells are written as unavailable.
///
/// # Errors
///
/// * [`MetricError::ExportEmpty`] if the table has no rows
/// * [`MetricError::Io`] if the folder cannot be created
/// * [`MetricError::Csv`] if a row cannot be written
pub fn write_csv(table: &MetricTable, dir: &Path) -> Result<PathBuf, MetricError> {
    if table.is_empty() {
        log::error!("{}", tr(Message::ExportEmpty, &[]));
        return Err(MetricError::ExportEmpty {
            file: table.file_name.clone(),
        });
    }

    let path = dir.join(&table.file_name);
    match write_rows(table, dir, &path) {
        Ok(()) => {
            log::info!("{}", tr(Message::ExportCompleted, &[&path.display()]));
            Ok(path)
        }
        Err(e) => {
            log::error!("{}", tr(Message::ExportFailed, &[&e]));
            Err(e)
        }
    }
}

fn write_rows(table: &MetricTable, dir: &Path, path: &Path) -> Result<(), MetricError> {
    std::fs::create_dir_all(dir).map_err(|e| MetricError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let csv_err = |source: csv::Error| MetricError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(&table.columns).map_err(csv_err)?;

    for row in &table.rows {
        let mut record = vec![row.year.to_string()];
        record.extend(table.columns.iter().skip(1).map(|column| {
            row.get(column)
                .unwrap_or(MetricValue::NotAvailable)
                .to_string()
        }));
        writer.write_record(&record).map_err(csv_err)?;
    }

    writer.flush().map_err(|e| MetricError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
