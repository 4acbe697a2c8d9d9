//! Zip bundles of the exported CSV files.
//!
//! The archive is written to a temporary file next to the CSVs and renamed
//! into place once complete, so an interrupted run never leaves a partial
//! zip under the final name.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use plateau_stats_messages::{Message, tr};

use crate::MetricError;

/// Archive file name stamped with `now`.
#[must_use]
pub fn archive_name(now: DateTime<Local>) -> String {
    tr(Message::ArchiveFileName, &[&now.format("%Y%m%d%H%M%S")])
}

/// CSV files directly inside `folder`, sorted by name.
///
/// # Errors
///
/// * [`MetricError::Io`] if the folder cannot be listed
pub fn csv_files(folder: &Path) -> Result<Vec<PathBuf>, MetricError> {
    let io_err = |source: std::io::Error| MetricError::Io {
        path: folder.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Bundles every CSV in `folder` into a timestamped zip inside it.
///
/// # Errors
///
/// * [`MetricError::NoCsvFiles`] if the folder holds no CSV
/// * [`MetricError::Io`] or [`MetricError::Zip`] if writing fails
pub fn archive_folder(folder: &Path) -> Result<PathBuf, MetricError> {
    let files = csv_files(folder)?;
    if files.is_empty() {
        log::warn!("{}", tr(Message::NoCsvFiles, &[&folder.display()]));
        return Err(MetricError::NoCsvFiles {
            folder: folder.to_path_buf(),
        });
    }

    let archive_path = folder.join(archive_name(Local::now()));
    let tmp_path = archive_path.with_extension("zip.tmp");

    if let Err(e) = write_zip(&files, &tmp_path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }

    std::fs::rename(&tmp_path, &archive_path).map_err(|e| MetricError::Io {
        path: archive_path.clone(),
        source: e,
    })?;

    log::info!("{}", tr(Message::ArchiveCreated, &[&archive_path.display()]));
    Ok(archive_path)
}

fn write_zip(files: &[PathBuf], tmp_path: &Path) -> Result<(), MetricError> {
    let io_err = |source: std::io::Error| MetricError::Io {
        path: tmp_path.to_path_buf(),
        source,
    };
    let zip_err = |source: zip::result::ZipError| MetricError::Zip {
        path: tmp_path.to_path_buf(),
        source,
    };

    let file = std::fs::File::create(tmp_path).map_err(io_err)?;
    let mut zip_writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for path in files {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let data = std::fs::read(path).map_err(|e| MetricError::Io {
            path: path.clone(),
            source: e,
        })?;
        zip_writer.start_file(name, options).map_err(zip_err)?;
        zip_writer.write_all(&data).map_err(io_err)?;
    }

    zip_writer.finish().map_err(zip_err)?;
    Ok(())
}
