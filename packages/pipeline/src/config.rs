//! Run configuration and its XML file.
//!
//! ```xml
//! <config>
//!   <paths><input>data</input><output>out</output><container>c.duckdb</container></paths>
//!   <thresholds><bus>300</bus><railway>800</railway><shelter>500</shelter></thresholds>
//!   <options><dissolve_buffers>true</dissolve_buffers><archive>true</archive><locale>ja</locale></options>
//!   <years><year>2020</year></years>
//! </config>
//! ```
//!
//! Every element is optional. A value that does not parse keeps its default.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use plateau_stats_ingest::IngestOptions;
use plateau_stats_messages::{Locale, Message, tr};
use plateau_stats_models::{ErrorKind, Year};
use roxmltree::{Document, Node};

/// Default container file name.
pub const CONTAINER_FILE: &str = "plateau_stats.duckdb";

/// Errors reading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file does not exist.
    #[error("Configuration file not found: {}", path.display())]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not well-formed XML.
    #[error("XML parsing error in {}: {source}", path.display())]
    Xml {
        /// Path being parsed.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: roxmltree::Error,
    },
}

impl ConfigError {
    /// Classifies this error in the shared taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } | Self::Io { .. } => ErrorKind::MissingInput,
            Self::Xml { .. } => ErrorKind::Format,
        }
    }
}

/// Everything a pipeline run needs besides the cancellation signal.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Root of the raw input folders.
    pub input: PathBuf,
    /// Folder receiving the container, CSV files and archive.
    pub output: PathBuf,
    /// Container file; relative paths are resolved against `output`.
    pub container: PathBuf,
    /// Bus stop reach in meters.
    pub bus_m: f64,
    /// Railway station reach in meters.
    pub railway_m: f64,
    /// Shelter reach in meters.
    pub shelter_m: f64,
    /// Whether coverage buffers are dissolved per category.
    pub dissolve_buffers: bool,
    /// Whether the CSV files are zipped after a complete run.
    pub archive: bool,
    /// Message language.
    pub locale: Locale,
    /// Years kept in the indicator tables; empty keeps all.
    pub years: Vec<Year>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let ingest = IngestOptions::default();
        Self {
            input: PathBuf::from("."),
            output: PathBuf::from("output"),
            container: PathBuf::from(CONTAINER_FILE),
            bus_m: ingest.bus_m,
            railway_m: ingest.railway_m,
            shelter_m: ingest.shelter_m,
            dissolve_buffers: ingest.dissolve_buffers,
            archive: true,
            locale: Locale::default(),
            years: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Reads `path`.
    ///
    /// # Errors
    ///
    /// * [`ConfigError::NotFound`] if the file does not exist
    /// * [`ConfigError::Io`] if it cannot be read
    /// * [`ConfigError::Xml`] if it is not well-formed XML
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_xml(&text).map_err(|source| ConfigError::Xml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads `path`, falling back to the defaults with a warning when the
    /// file is missing or malformed.
    #[must_use]
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(ConfigError::Xml { source, .. }) => {
                log::warn!("{}", tr(Message::XmlParseError, &[]));
                log::debug!("{source}");
                Self::default()
            }
            Err(e) => {
                log::warn!("{}", tr(Message::ConfigNotFound, &[]));
                log::debug!("{e}");
                Self::default()
            }
        }
    }

    /// Parses an XML document over the defaults.
    ///
    /// # Errors
    ///
    /// Returns the parser error if `xml` is not well-formed.
    pub fn from_xml(xml: &str) -> Result<Self, roxmltree::Error> {
        let doc = Document::parse(xml)?;
        let root = doc.root_element();
        let mut config = Self::default();

        if let Some(v) = text_at(root, &["paths", "input"]) {
            config.input = PathBuf::from(v);
        }
        if let Some(v) = text_at(root, &["paths", "output"]) {
            config.output = PathBuf::from(v);
        }
        if let Some(v) = text_at(root, &["paths", "container"]) {
            config.container = PathBuf::from(v);
        }
        parse_checked(root, &["thresholds", "bus"], &mut config.bus_m, is_distance);
        parse_checked(root, &["thresholds", "railway"], &mut config.railway_m, is_distance);
        parse_checked(root, &["thresholds", "shelter"], &mut config.shelter_m, is_distance);
        parse_into(root, &["options", "dissolve_buffers"], &mut config.dissolve_buffers);
        parse_into(root, &["options", "archive"], &mut config.archive);
        parse_into(root, &["options", "locale"], &mut config.locale);

        if let Some(years) = child(root, "years") {
            config.years = years
                .children()
                .filter(|n| n.has_tag_name("year"))
                .filter_map(|n| n.text())
                .filter_map(|t| t.trim().parse::<Year>().ok())
                .collect();
            config.years.sort_unstable();
            config.years.dedup();
        }
        Ok(config)
    }

    /// The container path with `output` applied to relative paths.
    #[must_use]
    pub fn container_path(&self) -> PathBuf {
        if self.container.is_absolute() {
            self.container.clone()
        } else {
            self.output.join(&self.container)
        }
    }

    /// Ingestion thresholds and toggles.
    #[must_use]
    pub const fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            bus_m: self.bus_m,
            railway_m: self.railway_m,
            shelter_m: self.shelter_m,
            dissolve_buffers: self.dissolve_buffers,
        }
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn text_at<'a>(root: Node<'a, 'a>, path: &[&str]) -> Option<&'a str> {
    let mut node = root;
    for name in path {
        node = child(node, name)?;
    }
    node.text().map(str::trim).filter(|t| !t.is_empty())
}

fn parse_into<T: FromStr>(root: Node<'_, '_>, path: &[&str], target: &mut T) {
    parse_checked(root, path, target, |_| true);
}

/// Like [`parse_into`], also keeping the default when `valid` rejects the
/// parsed value.
fn parse_checked<T: FromStr>(
    root: Node<'_, '_>,
    path: &[&str],
    target: &mut T,
    valid: impl Fn(&T) -> bool,
) {
    let Some(text) = text_at(root, path) else {
        return;
    };
    match text.parse() {
        Ok(value) if valid(&value) => *target = value,
        _ => log::warn!("Ignoring invalid value {text:?} for {}", path.join("/")),
    }
}

/// A reach in meters: finite and above zero.
#[must_use]
#[allow(clippy::trivially_copy_pass_by_ref)]
pub fn is_distance(meters: &f64) -> bool {
    meters.is_finite() && *meters > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PipelineConfig::default();
        assert!((config.bus_m - 300.0).abs() < f64::EPSILON);
        assert!((config.railway_m - 800.0).abs() < f64::EPSILON);
        assert!((config.shelter_m - 500.0).abs() < f64::EPSILON);
        assert!(config.dissolve_buffers);
        assert!(config.archive);
        assert_eq!(config.locale, Locale::En);
        assert_eq!(config.container_path(), Path::new("output").join(CONTAINER_FILE));
    }

    #[test]
    fn xml_overrides_and_keeps_defaults_for_bad_values() {
        let xml = r"<config>
            <paths><input>/data/in</input><output>/data/out</output></paths>
            <thresholds><bus>250</bus><railway>abc</railway></thresholds>
            <options><dissolve_buffers>false</dissolve_buffers><locale>JA</locale></options>
            <years><year>2020</year><year>2015</year><year>x</year><year>2020</year></years>
        </config>";
        let config = PipelineConfig::from_xml(xml).unwrap();
        assert_eq!(config.input, PathBuf::from("/data/in"));
        assert!((config.bus_m - 250.0).abs() < f64::EPSILON);
        assert!((config.railway_m - 800.0).abs() < f64::EPSILON);
        assert!(!config.dissolve_buffers);
        assert!(config.archive);
        assert_eq!(config.locale, Locale::Ja);
        assert_eq!(config.years, vec![Year(2015), Year(2020)]);
        assert_eq!(
            config.container_path(),
            PathBuf::from("/data/out").join(CONTAINER_FILE)
        );
    }

    #[test]
    fn non_positive_and_non_finite_thresholds_keep_defaults() {
        let xml = r"<config>
            <thresholds><bus>0</bus><railway>-50</railway><shelter>NaN</shelter></thresholds>
        </config>";
        let config = PipelineConfig::from_xml(xml).unwrap();
        assert!((config.bus_m - 300.0).abs() < f64::EPSILON);
        assert!((config.railway_m - 800.0).abs() < f64::EPSILON);
        assert!((config.shelter_m - 500.0).abs() < f64::EPSILON);

        let config = PipelineConfig::from_xml("<config><thresholds><shelter>inf</shelter></thresholds></config>").unwrap();
        assert!((config.shelter_m - 500.0).abs() < f64::EPSILON);
        assert!(is_distance(&0.5));
    }

    #[test]
    fn missing_and_malformed_files_fall_back() {
        let dir = std::env::temp_dir().join(format!(
            "plateau_stats_pipeline_config_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let missing = dir.join("absent.xml");
        assert_eq!(
            PipelineConfig::load(&missing).unwrap_err().kind(),
            ErrorKind::MissingInput
        );
        assert_eq!(PipelineConfig::load_or_default(&missing), PipelineConfig::default());

        let broken = dir.join("broken.xml");
        std::fs::write(&broken, "<config><paths>").unwrap();
        assert!(matches!(
            PipelineConfig::load(&broken),
            Err(ConfigError::Xml { .. })
        ));
        assert_eq!(PipelineConfig::load_or_default(&broken), PipelineConfig::default());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
