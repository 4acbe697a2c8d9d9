//! Finding source files under the input root.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// All files under `dir` (recursively) whose extension matches `ext`,
/// case-insensitively, sorted by path.
///
/// A missing directory yields an empty list.
#[must_use]
pub fn find_files(dir: &Path, ext: &str) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping unreadable entry under {}: {e}", dir.display());
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| {
            path.extension()
                .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
        })
        .collect();

    files.sort();
    files
}

/// All `.shp` files under `dir`.
#[must_use]
pub fn find_shapefiles(dir: &Path) -> Vec<PathBuf> {
    find_files(dir, "shp")
}

/// Directories under `dir` (including `dir`) that contain a file named
/// `marker`, sorted by path. Used to locate GTFS feeds by `stops.txt`.
#[must_use]
pub fn find_dirs_containing(dir: &Path, marker: &str) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let mut dirs: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir() && entry.path().join(marker).is_file())
        .map(walkdir::DirEntry::into_path)
        .collect();

    dirs.sort();
    dirs
}

/// Immediate subdirectories of `dir`, sorted by path.
#[must_use]
pub fn subdirectories(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs
}
