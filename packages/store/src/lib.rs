#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The spatial container: one `DuckDB` file holding every named layer.
//!
//! Layers are stored in two plain tables, with geometry as `GeoJSON` TEXT
//! and attributes as a JSON object per feature:
//!
//! * `layer_catalog(name, geometry_kind, crs, year, fields_json, feature_count)`
//! * `layer_features(layer, fid, geometry_geojson, attributes_json)`
//!
//! Adding a layer replaces any layer of the same name inside one
//! transaction. The tables carry no key constraints; name uniqueness is
//! kept by deleting before inserting.

pub mod panel;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use duckdb::{Connection, params};
use plateau_stats_messages::{Message, tr};
use plateau_stats_models::{Attributes, ErrorKind, Feature, GeometryKind, Layer, Year};
use plateau_stats_spatial::convert::{from_geojson, to_geojson};

pub use panel::{InMemoryPanel, LayerPanel, NullPanel, Registration};

/// Rows per multi-row INSERT statement.
const CHUNK_SIZE: usize = 500;

/// Errors from the spatial container.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The container file could not be created or opened.
    #[error("Failed to create GeoPackage {path}: {source}")]
    Create {
        /// Container path.
        path: PathBuf,
        /// Underlying error.
        source: duckdb::Error,
    },

    /// File system error around the container file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A query or write failed.
    #[error("Container error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Attribute or schema JSON could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The requested layer is not in the container.
    #[error("The {name} layer was not found.")]
    LayerNotFound {
        /// Layer name.
        name: String,
    },

    /// A stored value could not be read back.
    #[error("Corrupt layer {layer}: {message}")]
    Corrupt {
        /// Layer name.
        layer: String,
        /// What was wrong.
        message: String,
    },
}

impl StoreError {
    /// Classifies this error in the shared taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::LayerNotFound { .. } => ErrorKind::MissingInput,
            Self::Create { .. }
            | Self::Io { .. }
            | Self::DuckDb(_)
            | Self::Json(_)
            | Self::Corrupt { .. } => ErrorKind::Persistence,
        }
    }
}

/// Owner of the single container file.
pub struct SpatialContainerStore {
    path: PathBuf,
    conn: Connection,
    panel: Box<dyn LayerPanel>,
    /// Names already offered to the panel for this container.
    listed: BTreeSet<String>,
}

impl std::fmt::Debug for SpatialContainerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialContainerStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SpatialContainerStore {
    /// Creates a new empty container at `path`, deleting any file there.
    ///
    /// # Errors
    ///
    /// * [`StoreError::Io`] if the old file cannot be removed
    /// * [`StoreError::Create`] if the new file cannot be created
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        for stale in [path.to_path_buf(), wal_path(path)] {
            if stale.exists() {
                std::fs::remove_file(&stale).map_err(|source| StoreError::Io {
                    path: stale.clone(),
                    source,
                })?;
            }
        }
        Self::open(path)
    }

    /// Opens the container at `path`, creating it when missing.
    ///
    /// # Errors
    ///
    /// * [`StoreError::Io`] if the parent directory cannot be created
    /// * [`StoreError::Create`] if the file cannot be opened
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = connect(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            conn,
            panel: Box::new(NullPanel),
            listed: BTreeSet::new(),
        })
    }

    /// Attaches a host layer panel.
    #[must_use]
    pub fn with_panel(mut self, panel: impl LayerPanel + 'static) -> Self {
        self.panel = Box::new(panel);
        self.listed.clear();
        self
    }

    /// Container file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Repoints the store at `new_path`, opening (or creating) it. The old
    /// file is left on disk.
    ///
    /// # Errors
    ///
    /// Same as [`SpatialContainerStore::open`]; on error the store keeps
    /// its previous container.
    pub fn reset(&mut self, new_path: &Path) -> Result<(), StoreError> {
        let conn = connect(new_path)?;
        self.conn = conn;
        self.path = new_path.to_path_buf();
        self.listed.clear();
        log::info!("{}", tr(Message::ManagerReset, &[&new_path.display()]));
        Ok(())
    }

    /// Writes `layer`, replacing a layer of the same name, and lists it on
    /// the panel.
    ///
    /// # Errors
    ///
    /// * [`StoreError`] with kind `Persistence` if the write fails
    pub fn add_layer(&mut self, layer: &Layer) -> Result<(), StoreError> {
        self.add_layer_unlisted(layer)?;
        if self.listed.contains(&layer.name) {
            return Ok(());
        }
        let container = self.path.display().to_string();
        match self.panel.register(&container, &layer.name) {
            Registration::Added => {
                log::info!("{}", tr(Message::PanelRegistered, &[&layer.name]));
            }
            Registration::AlreadyPresent => {
                log::debug!("{}", tr(Message::PanelAlreadyPresent, &[&layer.name]));
            }
        }
        self.listed.insert(layer.name.clone());
        Ok(())
    }

    /// Writes `layer` without touching the panel.
    ///
    /// # Errors
    ///
    /// * [`StoreError`] with kind `Persistence` if the write fails
    pub fn add_layer_unlisted(&mut self, layer: &Layer) -> Result<(), StoreError> {
        if self.contains(&layer.name)? {
            log::info!("{}", tr(Message::LayerOverwritten, &[&layer.name]));
        }

        let fields_json = serde_json::to_string(&layer.fields)?;
        let rows = layer
            .features
            .iter()
            .map(|f| {
                Ok((
                    f.geometry.as_ref().map(to_geojson),
                    serde_json::to_string(&f.attributes)?,
                ))
            })
            .collect::<Result<Vec<(Option<String>, String)>, StoreError>>()?;

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM layer_features WHERE layer = ?", params![layer.name])?;
        tx.execute("DELETE FROM layer_catalog WHERE name = ?", params![layer.name])?;
        tx.execute(
            "INSERT INTO layer_catalog
                (name, geometry_kind, crs, year, fields_json, feature_count)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                layer.name,
                layer.kind.as_ref(),
                layer.crs,
                layer.year.map(Year::as_i64),
                fields_json,
                i64::try_from(rows.len()).unwrap_or(i64::MAX),
            ],
        )?;

        let mut fid = 0i64;
        for chunk in rows.chunks(CHUNK_SIZE) {
            let mut sql = String::from(
                "INSERT INTO layer_features (layer, fid, geometry_geojson, attributes_json) VALUES ",
            );
            for i in 0..chunk.len() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str("(?, ?, ?, ?)");
            }

            let mut stmt = tx.prepare(&sql)?;
            let mut param_idx = 1usize;
            for (geometry, attributes) in chunk {
                stmt.raw_bind_parameter(param_idx, &layer.name)?;
                stmt.raw_bind_parameter(param_idx + 1, fid)?;
                stmt.raw_bind_parameter(param_idx + 2, geometry.as_deref())?;
                stmt.raw_bind_parameter(param_idx + 3, attributes)?;
                param_idx += 4;
                fid += 1;
            }
            stmt.raw_execute()?;
        }
        tx.commit()?;

        log::info!(
            "{}",
            tr(Message::LayerAdded, &[&layer.name, &self.path.display()])
        );
        Ok(())
    }

    /// Removes the layer `name`.
    ///
    /// # Errors
    ///
    /// * [`StoreError::LayerNotFound`] if there is no such layer
    /// * [`StoreError::DuckDb`] if the delete fails
    pub fn delete_layer(&mut self, name: &str) -> Result<(), StoreError> {
        if !self.contains(name)? {
            return Err(StoreError::LayerNotFound {
                name: name.to_string(),
            });
        }

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM layer_features WHERE layer = ?", params![name])?;
        tx.execute("DELETE FROM layer_catalog WHERE name = ?", params![name])?;
        tx.commit()?;

        log::info!(
            "{}",
            tr(Message::LayerDeleted, &[&name, &self.path.display()])
        );
        Ok(())
    }

    /// Reads the layer `name` back.
    ///
    /// # Errors
    ///
    /// * [`StoreError::LayerNotFound`] if there is no such layer
    /// * [`StoreError::Corrupt`] / [`StoreError::Json`] for unreadable rows
    pub fn load_layer(&self, name: &str) -> Result<Layer, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT geometry_kind, crs, year, fields_json FROM layer_catalog WHERE name = ?",
        )?;
        let header = stmt.query_row(params![name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, String>(3)?,
            ))
        });
        let (kind, crs, year, fields_json) = match header {
            Ok(header) => header,
            Err(duckdb::Error::QueryReturnedNoRows) => {
                return Err(StoreError::LayerNotFound {
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(StoreError::DuckDb(e)),
        };

        let corrupt = |message: String| StoreError::Corrupt {
            layer: name.to_string(),
            message,
        };

        let kind: GeometryKind = kind
            .parse()
            .map_err(|_| corrupt(format!("unknown geometry kind {kind}")))?;
        let mut layer = Layer::new(name, kind);
        layer.crs = crs;
        layer.year = year.and_then(|y| u16::try_from(y).ok()).map(Year);
        layer.fields = serde_json::from_str(&fields_json)?;

        let mut stmt = self.conn.prepare(
            "SELECT fid, geometry_geojson, attributes_json FROM layer_features
             WHERE layer = ? ORDER BY fid",
        )?;
        let mut rows = stmt.query(params![name])?;
        while let Some(row) = rows.next()? {
            let fid: i64 = row.get(0)?;
            let geometry_text: Option<String> = row.get(1)?;
            let attributes_text: String = row.get(2)?;

            let geometry = match geometry_text {
                Some(text) => Some(
                    from_geojson(&text)
                        .ok_or_else(|| corrupt(format!("feature {fid} has unreadable geometry")))?,
                ),
                None => None,
            };
            let attributes: Attributes = serde_json::from_str(&attributes_text)?;
            layer.features.push(Feature {
                geometry,
                attributes,
            });
        }

        log::debug!("{}", tr(Message::LayerLoaded, &[&name]));
        Ok(layer)
    }

    /// Names of every stored layer, sorted.
    ///
    /// # Errors
    ///
    /// * [`StoreError::DuckDb`] if the catalog cannot be read
    pub fn layer_names(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM layer_catalog ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Feature count of each stored layer, sorted by name.
    ///
    /// # Errors
    ///
    /// * [`StoreError::DuckDb`] if the catalog cannot be read
    pub fn layer_summaries(&self) -> Result<Vec<(String, u64)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, feature_count FROM layer_catalog ORDER BY name")?;
        let rows = stmt
            .query_map([], |row| {
                let count: i64 = row.get(1)?;
                Ok((row.get::<_, String>(0)?, u64::try_from(count).unwrap_or(0)))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Whether a layer called `name` is stored.
    ///
    /// # Errors
    ///
    /// * [`StoreError::DuckDb`] if the catalog cannot be read
    pub fn contains(&self, name: &str) -> Result<bool, StoreError> {
        let count: i64 = self
            .conn
            .prepare("SELECT COUNT(*) FROM layer_catalog WHERE name = ?")?
            .query_row(params![name], |row| row.get(0))?;
        Ok(count > 0)
    }
}

fn wal_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".wal");
    PathBuf::from(name)
}

fn connect(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let existed = path.exists();
    let create_err = |source: duckdb::Error| {
        log::error!("{}", tr(Message::ContainerCreateFailed, &[&source]));
        StoreError::Create {
            path: path.to_path_buf(),
            source,
        }
    };
    let conn = Connection::open(path).map_err(create_err)?;
    create_schema(&conn).map_err(create_err)?;

    if !existed {
        log::info!("{}", tr(Message::ContainerInitialized, &[&path.display()]));
    }
    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<(), duckdb::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS layer_catalog (
            name TEXT NOT NULL,
            geometry_kind TEXT NOT NULL,
            crs TEXT NOT NULL,
            year BIGINT,
            fields_json TEXT NOT NULL,
            feature_count BIGINT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS layer_features (
            layer TEXT NOT NULL,
            fid BIGINT NOT NULL,
            geometry_geojson TEXT,
            attributes_json TEXT NOT NULL
        );",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Geometry, Point, polygon};
    use plateau_stats_models::AttrValue;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "plateau_stats_store_{name}_{}",
            std::process::id()
        ));
        if dir.exists() {
            std::fs::remove_dir_all(&dir).unwrap();
        }
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn zones(city: &str) -> Layer {
        let mut layer = Layer::new("zones", GeometryKind::Polygon).with_fields(&["key_code", "city"]);
        let poly = polygon![(x: 139.0, y: 35.0), (x: 139.1, y: 35.0), (x: 139.1, y: 35.1)];
        layer.push(
            Feature::new(Geometry::Polygon(poly))
                .with("key_code", "13101")
                .with("city", city)
                .with("area", 1.5)
                .with("count", 3_i64),
        );
        layer
    }

    #[test]
    fn layers_round_trip() {
        let dir = scratch("round_trip");
        let mut store = SpatialContainerStore::create(&dir.join("c.duckdb")).unwrap();

        let mut points = Layer::new("vacancies", GeometryKind::Point);
        points.year = Some(Year(2020));
        points.push(Feature::new(Geometry::Point(Point::new(139.5, 35.5))).with("year", 2020_i64));
        points.push(Feature::new(None).with("year", AttrValue::Null));
        store.add_layer(&points).unwrap();
        store.add_layer(&zones("千代田区")).unwrap();

        let back = store.load_layer("vacancies").unwrap();
        assert_eq!(back, points);
        let back = store.load_layer("zones").unwrap();
        assert_eq!(back.features[0].f64("area"), Some(1.5));
        assert_eq!(back.features[0].get("count"), &AttrValue::Int(3));
        assert_eq!(back.features[0].text("city"), "千代田区");
        assert_eq!(back.fields[..2], ["key_code".to_string(), "city".to_string()]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn re_adding_overwrites_and_registers_once() {
        let dir = scratch("overwrite");
        let panel = InMemoryPanel::new();
        let mut store = SpatialContainerStore::create(&dir.join("c.duckdb"))
            .unwrap()
            .with_panel(panel.clone());

        store.add_layer(&zones("A")).unwrap();
        store.add_layer(&zones("B")).unwrap();

        assert_eq!(store.layer_names().unwrap(), vec!["zones".to_string()]);
        let back = store.load_layer("zones").unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back.features[0].text("city"), "B");
        assert_eq!(panel.names(), vec!["zones".to_string()]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    /// Accepts every registration and counts the calls.
    #[derive(Clone, Default)]
    struct CountingPanel {
        calls: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl LayerPanel for CountingPanel {
        fn register(&mut self, _container: &str, layer: &str) -> Registration {
            self.calls.lock().unwrap().push(layer.to_string());
            Registration::Added
        }
    }

    #[test]
    fn each_name_is_offered_to_the_panel_once() {
        let dir = scratch("register_once");
        let panel = CountingPanel::default();
        let mut store = SpatialContainerStore::create(&dir.join("c.duckdb"))
            .unwrap()
            .with_panel(panel.clone());

        store.add_layer(&zones("A")).unwrap();
        store.add_layer(&zones("B")).unwrap();
        store.add_layer(&Layer::new("meshes", GeometryKind::Polygon)).unwrap();
        store.add_layer(&zones("C")).unwrap();

        assert_eq!(
            *panel.calls.lock().unwrap(),
            vec!["zones".to_string(), "meshes".to_string()]
        );

        store.reset(&dir.join("other.duckdb")).unwrap();
        store.add_layer(&zones("D")).unwrap();
        assert_eq!(panel.calls.lock().unwrap().len(), 3);

        drop(store);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unlisted_layers_skip_the_panel() {
        let dir = scratch("unlisted");
        let panel = InMemoryPanel::new();
        let mut store = SpatialContainerStore::create(&dir.join("c.duckdb"))
            .unwrap()
            .with_panel(panel.clone());

        let table = Layer::new("population_target_settings", GeometryKind::None);
        store.add_layer_unlisted(&table).unwrap();

        assert!(store.contains("population_target_settings").unwrap());
        assert!(panel.names().is_empty());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_layers_are_missing_input() {
        let dir = scratch("missing");
        let mut store = SpatialContainerStore::create(&dir.join("c.duckdb")).unwrap();

        let err = store.load_layer("zones").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingInput);
        let err = store.delete_layer("zones").unwrap_err();
        assert!(matches!(err, StoreError::LayerNotFound { .. }));

        store.add_layer(&zones("A")).unwrap();
        store.delete_layer("zones").unwrap();
        assert!(!store.contains("zones").unwrap());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn reset_points_at_a_new_file_and_keeps_the_old_one() {
        let dir = scratch("reset");
        let first = dir.join("first.duckdb");
        let second = dir.join("nested").join("second.duckdb");

        let mut store = SpatialContainerStore::create(&first).unwrap();
        store.add_layer(&zones("A")).unwrap();
        store.reset(&second).unwrap();

        assert_eq!(store.path(), second.as_path());
        assert!(store.layer_names().unwrap().is_empty());
        assert!(first.exists());

        drop(store);
        let reopened = SpatialContainerStore::open(&first).unwrap();
        assert!(reopened.contains("zones").unwrap());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn create_discards_previous_contents() {
        let dir = scratch("recreate");
        let path = dir.join("c.duckdb");
        {
            let mut store = SpatialContainerStore::create(&path).unwrap();
            store.add_layer(&zones("A")).unwrap();
        }
        let store = SpatialContainerStore::create(&path).unwrap();
        assert!(store.layer_names().unwrap().is_empty());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
