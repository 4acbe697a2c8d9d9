//! Year tags parsed from source paths.

use std::path::Path;
use std::sync::LazyLock;

use plateau_stats_models::Year;
use regex::Regex;

/// Default pattern: four digits followed by `年` (e.g. `2020年`).
pub const DEFAULT_YEAR_PATTERN: &str = r"(\d{4})年";

static DEFAULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(DEFAULT_YEAR_PATTERN).unwrap_or_else(|e| unreachable!("bad year pattern: {e}"))
});

/// The default year pattern, compiled once.
#[must_use]
pub fn default_pattern() -> &'static Regex {
    &DEFAULT_RE
}

/// First year matched by `pattern` in `text`. The pattern's first capture
/// group holds the digits; without groups the whole match is used.
#[must_use]
pub fn extract_year_with(pattern: &Regex, text: &str) -> Option<Year> {
    let caps = pattern.captures(text)?;
    let digits = caps.get(1).or_else(|| caps.get(0))?;
    digits.as_str().parse().ok()
}

/// First `NNNN年` in `path`.
#[must_use]
pub fn extract_year(path: &Path) -> Option<Year> {
    extract_year_with(default_pattern(), &path.to_string_lossy())
}

/// First `NNNN年` in the part of `path` below `root`. Folders above the
/// source root (the input location itself) are never read.
#[must_use]
pub fn extract_year_below(root: &Path, path: &Path) -> Option<Year> {
    match path.strip_prefix(root) {
        Ok(relative) => extract_year(relative),
        Err(_) => path.file_name().and_then(|name| extract_year(Path::new(name))),
    }
}
