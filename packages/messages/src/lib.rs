#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! User-facing messages with `%1`..`%9` placeholders.
//!
//! Every message has an English source template on [`Message`]. Translations
//! live in embedded TOML catalogs keyed by the message's snake_case name. The
//! active [`Locale`] is chosen once at startup via [`set_locale`]; rendering
//! falls back to English for anything the catalog lacks.
//!
//! Messages are for display and logging only. Nothing in the pipeline
//! branches on rendered text.

mod catalog;

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

/// Display language.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Locale {
    /// English source templates.
    #[default]
    En,
    /// Japanese catalog.
    Ja,
}

static LOCALE: OnceLock<Locale> = OnceLock::new();

/// Selects the process-wide locale. Returns `false` if one was already set.
pub fn set_locale(locale: Locale) -> bool {
    LOCALE.set(locale).is_ok()
}

/// The active locale; English until [`set_locale`] is called.
#[must_use]
pub fn locale() -> Locale {
    LOCALE.get().copied().unwrap_or_default()
}

/// Every message the toolchain shows to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Message {
    ContainerInitialized,
    ContainerCreateFailed,
    ManagerReset,
    LayerAdded,
    LayerOverwritten,
    LayerDeleted,
    LayerLoaded,
    PanelRegistered,
    PanelAlreadyPresent,
    LayerNotFound,
    FileNotFound,
    FieldNotFound,
    NoValidShapefile,
    ShapefileNotFound,
    ShapefileToImport,
    MissingDbf,
    FallbackEncoding,
    DetectedEncoding,
    DecodeFailed,
    YearExtractionFailed,
    YearFieldNotFound,
    NoYearData,
    FixingGeometries,
    FixedGeometries,
    FeatureDropped,
    UnsupportedGeometry,
    NotAPoint,
    ShelterNotPoint,
    CannotLoadAs,
    ProcessingGtfs,
    GenerationCompleted,
    PopulationAssigned,
    VacancyAssigned,
    NoVacancyPoints,
    FuturePopulationAdded,
    LandPriceAdded,
    TargetPopulation,
    TargetPopulationMissing,
    ExportEmpty,
    ExportCompleted,
    ExportFailed,
    NoCsvFiles,
    ArchiveFileName,
    ArchiveCreated,
    ConfigNotFound,
    XmlParseError,
    StageStarted,
    StageRecovered,
    Processing,
    ProcessingCompleted,
    ProcessingCanceled,
    ErrorOccurred,
}

impl Message {
    /// English source template.
    #[must_use]
    pub const fn template(self) -> &'static str {
        match self {
            Self::ContainerInitialized => "GeoPackage initialization completed. Path: %1",
            Self::ContainerCreateFailed => "Failed to create GeoPackage: %1",
            Self::ManagerReset => "GeoPackage Manager has been reset. New path: %1.",
            Self::LayerAdded => "Layer %1 added to GeoPackage %2.",
            Self::LayerOverwritten => "Layer %1 already exists and will be overwritten.",
            Self::LayerDeleted => "Layer %1 deleted from GeoPackage %2.",
            Self::LayerLoaded => "GeoPackage layer %1 loaded.",
            Self::PanelRegistered => "GeoPackage layer %1 added to the layer panel.",
            Self::PanelAlreadyPresent => "%1 already exists in the layer panel",
            Self::LayerNotFound => "The %1 layer was not found.",
            Self::FileNotFound => "%1 was not found.",
            Self::FieldNotFound => "The field %1 does not exist.",
            Self::NoValidShapefile => "No valid %1 Shapefile was found.",
            Self::ShapefileNotFound => "The Shapefile for %1 was not found.",
            Self::ShapefileToImport => "Shapefile to be imported: %1",
            Self::MissingDbf => {
                "No corresponding DBF file was found for the specified path: %1."
            }
            Self::FallbackEncoding => "%1 was detected. Using SHIFT_JIS for the file %2.",
            Self::DetectedEncoding => "Detected encoding: %1",
            Self::DecodeFailed => "Failed to decode %1 as UTF-8 or SHIFT_JIS.",
            Self::YearExtractionFailed => "Failed to extract year from file path: %1",
            Self::YearFieldNotFound => "The year field was not found in %1.",
            Self::NoYearData => "The %1 layer does not contain year data.",
            Self::FixingGeometries => "Fixing invalid geometries in layer: %1.",
            Self::FixedGeometries => "Completed fixing invalid geometries in layer: %1.",
            Self::FeatureDropped => "Feature %1 of %2 was dropped: %3",
            Self::UnsupportedGeometry => "Unsupported geometry type: %1",
            Self::NotAPoint => "Feature %1 of %2 is not a Point and was excluded.",
            Self::ShelterNotPoint => "Shelter geometry is not a Point: %1",
            Self::CannotLoadAs => "%1 cannot be loaded as %2 data.",
            Self::ProcessingGtfs => "Processing GTFS folder: %1",
            Self::GenerationCompleted => "%1 data generation completed.",
            Self::PopulationAssigned => "Completed attaching population to buildings.",
            Self::VacancyAssigned => "Completed setting vacant house flags.",
            Self::NoVacancyPoints => "No vacant house points were found for the year %1.",
            Self::FuturePopulationAdded => {
                "Adding future estimated population data has been completed."
            }
            Self::LandPriceAdded => {
                "Added average land price and its changes to the mesh layer."
            }
            Self::TargetPopulation => "Comparative future year: %1, Target population: %2",
            Self::TargetPopulationMissing => "Target population data was not found.",
            Self::ExportEmpty => "The data to export is empty.",
            Self::ExportCompleted => "File export completed: %1.",
            Self::ExportFailed => "An error occurred during file export: %1.",
            Self::NoCsvFiles => "No CSV files were found in the selected folder: %1",
            Self::ArchiveFileName => "valuation index_%1.zip",
            Self::ArchiveCreated => "Archive created: %1",
            Self::ConfigNotFound => "Configuration file not found. Using default values.",
            Self::XmlParseError => "XML parsing error. Using default values.",
            Self::StageStarted => "Stage %1 started (%2%).",
            Self::StageRecovered => "Stage %1 finished with %2 skipped item(s).",
            Self::Processing => "Processing...",
            Self::ProcessingCompleted => "Processing completed",
            Self::ProcessingCanceled => "Processing was canceled",
            Self::ErrorOccurred => "An error occurred: %1",
        }
    }

    /// Snake-case catalog key.
    #[must_use]
    pub fn key(self) -> &'static str {
        self.into()
    }

    /// Renders the message in `locale`.
    #[must_use]
    pub fn render_in(self, locale: Locale, args: &[&dyn fmt::Display]) -> String {
        let template = catalog::message(locale, self).unwrap_or_else(|| self.template());
        substitute(template, args)
    }

    /// Renders the message in the active locale.
    #[must_use]
    pub fn render(self, args: &[&dyn fmt::Display]) -> String {
        self.render_in(locale(), args)
    }
}

/// Renders `message` in the active locale.
///
/// Shorthand for [`Message::render`].
#[must_use]
pub fn tr(message: Message, args: &[&dyn fmt::Display]) -> String {
    message.render(args)
}

/// Translates a free-standing label (domain or layer display name).
///
/// Labels missing from the catalog are returned unchanged.
#[must_use]
pub fn label(text: &str) -> String {
    catalog::label(locale(), text).map_or_else(|| text.to_string(), str::to_string)
}

/// Replaces `%1`..`%9` with the matching positional argument.
///
/// Placeholders without an argument are left untouched.
#[must_use]
pub fn substitute(template: &str, args: &[&dyn fmt::Display]) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '%' {
            let arg = chars
                .peek()
                .and_then(|d| d.to_digit(10))
                .filter(|n| *n >= 1)
                .and_then(|n| args.get(n as usize - 1));
            if let Some(arg) = arg {
                chars.next();
                out.push_str(&arg.to_string());
                continue;
            }
        }
        out.push(c);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn substitutes_positional_arguments() {
        let rendered = Message::LayerAdded.render_in(Locale::En, &[&"zones", &"out.duckdb"]);
        assert_eq!(rendered, "Layer zones added to GeoPackage out.duckdb.");
    }

    #[test]
    fn leaves_unknown_placeholders() {
        assert_eq!(substitute("%1 and %2", &[&"a"]), "a and %2");
        assert_eq!(substitute("100% done %0", &[&"x"]), "100% done %0");
    }

    #[test]
    fn japanese_catalog_covers_every_message() {
        for message in Message::iter() {
            assert!(
                catalog::message(Locale::Ja, message).is_some(),
                "missing ja translation for {}",
                message.key()
            );
        }
    }

    #[test]
    fn japanese_rendering_keeps_arguments() {
        let rendered = Message::ErrorOccurred.render_in(Locale::Ja, &[&"boom"]);
        assert_eq!(rendered, "エラーが発生しました: boom");
    }

    #[test]
    fn english_has_no_catalog() {
        assert_eq!(catalog::message(Locale::En, Message::ExportEmpty), None);
        assert_eq!(
            Message::ExportEmpty.render_in(Locale::En, &[]),
            "The data to export is empty."
        );
    }

    #[test]
    fn locale_parses_case_insensitively() {
        assert_eq!("JA".parse::<Locale>().ok(), Some(Locale::Ja));
        assert_eq!("en".parse::<Locale>().ok(), Some(Locale::En));
    }
}
