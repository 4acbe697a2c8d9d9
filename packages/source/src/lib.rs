#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Readers for the raw municipal source data.
//!
//! Shapefiles are parsed directly ([`shp`] for geometry, [`dbf`] for the
//! attribute sidecar) and combined by [`shapefile::read_shapefile`]. Text in
//! DBF and CSV sources is decoded as UTF-8 with a Shift_JIS fallback (see
//! [`encoding`]). [`gtfs`] turns a GTFS feed into bus stop and segment
//! records, and [`discovery`] / [`year`] locate inputs and tag them by year.

pub mod dbf;
pub mod discovery;
pub mod encoding;
pub mod gtfs;
pub mod progress;
pub mod shapefile;
pub mod shp;
pub mod table;
#[cfg(any(test, feature = "test-utils"))]
pub mod write;
pub mod year;

use std::path::{Path, PathBuf};

use plateau_stats_models::ErrorKind;

/// Errors that can occur while reading source datasets.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// I/O error while reading a file.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// The file being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The Shapefile has no `.dbf` attribute table next to it.
    #[error("No corresponding DBF file was found for the specified path: {path}")]
    MissingTable {
        /// Path of the `.shp` file.
        path: PathBuf,
    },

    /// A required input (file or folder) does not exist.
    #[error("{what} was not found")]
    NotFound {
        /// Description of the missing input.
        what: String,
    },

    /// Text could not be decoded as UTF-8 or Shift_JIS.
    #[error("Failed to decode {path} as UTF-8 or Shift_JIS")]
    Encoding {
        /// The undecodable file.
        path: PathBuf,
    },

    /// The file structure is malformed.
    #[error("Malformed {path}: {message}")]
    Format {
        /// The malformed file.
        path: PathBuf,
        /// What was wrong.
        message: String,
    },

    /// The Shapefile uses a shape type that is not supported.
    #[error("Unsupported geometry type: {shape_type} in {path}")]
    UnsupportedShape {
        /// The Shapefile.
        path: PathBuf,
        /// Raw shape type code from the header.
        shape_type: i32,
    },

    /// CSV parsing failed.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// The CSV file.
        path: PathBuf,
        /// Underlying error.
        source: csv::Error,
    },
}

impl SourceError {
    /// Classifies this error in the shared taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingTable { .. } | Self::NotFound { .. } => ErrorKind::MissingInput,
            Self::Encoding { .. } => ErrorKind::Encoding,
            Self::Io { .. }
            | Self::Format { .. }
            | Self::UnsupportedShape { .. }
            | Self::Csv { .. } => ErrorKind::Format,
        }
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn format(path: &Path, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::path::PathBuf;

    /// Creates an empty scratch directory unique to `name`.
    pub fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "plateau_stats_source_{name}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
