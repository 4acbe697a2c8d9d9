//! Text decoding with a Shift_JIS fallback.
//!
//! Municipal datasets are published in either UTF-8 or Shift_JIS, often
//! without saying which. A `.cpg` sidecar, when present, names the code page
//! and wins over detection.

use std::path::Path;

use encoding_rs::{Encoding, SHIFT_JIS, UTF_8};

/// Result of decoding a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// Decoded with the primary encoding (UTF-8, or the `.cpg` code page).
    Primary(String),
    /// The primary encoding failed and Shift_JIS succeeded.
    Fallback(String),
    /// Neither encoding produced valid text.
    Failed,
}

impl DecodeOutcome {
    /// The decoded text, if any.
    #[must_use]
    pub fn text(self) -> Option<String> {
        match self {
            Self::Primary(s) | Self::Fallback(s) => Some(s),
            Self::Failed => None,
        }
    }
}

/// Decodes `bytes` strictly as `encoding`, rejecting malformed input.
#[must_use]
pub fn decode_strict(bytes: &[u8], encoding: &'static Encoding) -> Option<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(std::borrow::Cow::into_owned)
}

/// Tries UTF-8 first, then Shift_JIS.
///
/// A leading UTF-8 byte order mark is dropped.
#[must_use]
pub fn decode_with_fallback(bytes: &[u8]) -> DecodeOutcome {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if let Some(text) = decode_strict(bytes, UTF_8) {
        return DecodeOutcome::Primary(text);
    }
    decode_strict(bytes, SHIFT_JIS).map_or(DecodeOutcome::Failed, DecodeOutcome::Fallback)
}

/// Picks the encoding a whole byte buffer decodes under.
#[must_use]
pub fn detect(bytes: &[u8]) -> Option<&'static Encoding> {
    if decode_strict(bytes, UTF_8).is_some() {
        Some(UTF_8)
    } else if decode_strict(bytes, SHIFT_JIS).is_some() {
        Some(SHIFT_JIS)
    } else {
        None
    }
}

/// Reads the code page named by a `.cpg` sidecar, if present and known.
#[must_use]
pub fn encoding_from_cpg(shp_or_dbf: &Path) -> Option<&'static Encoding> {
    let cpg = shp_or_dbf.with_extension("cpg");
    let raw = std::fs::read(&cpg).ok()?;
    let label = String::from_utf8_lossy(&raw);
    let label = label.trim();

    let encoding = match label.to_ascii_uppercase().as_str() {
        "932" | "CP932" | "SJIS" | "SHIFT-JIS" => Some(SHIFT_JIS),
        "65001" => Some(UTF_8),
        _ => Encoding::for_label(label.as_bytes()),
    };

    if encoding.is_none() {
        log::warn!("Unknown code page '{label}' in {}", cpg.display());
    }
    encoding
}
