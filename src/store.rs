//! Backend enablement source.
//!
//! The registry asks the store for the set of enabled backend names once per
//! (re)build. Two implementations are provided: [`MemoryStore`] for embedding
//! and tests, and [`JsonFileStore`] which persists a `{"name": bool}` object
//! on disk.

use crate::error::StractError;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tracing::debug;

/// Key-value store of backend enable flags.
///
/// Implementations must be read-after-write consistent within one process.
pub trait EnablementStore: Send + Sync {
    /// Names whose flag is set.
    fn enabled_names(&self) -> Result<BTreeSet<String>, StractError>;

    /// Set or clear the flag for `name`.
    fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), StractError>;
}

/// In-memory store. An empty store means "nothing configured".
#[derive(Debug, Default)]
pub struct MemoryStore {
    enabled: RwLock<BTreeSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `names` enabled.
    pub fn with_enabled<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enabled: RwLock::new(names.into_iter().map(Into::into).collect()),
        }
    }
}

impl EnablementStore for MemoryStore {
    fn enabled_names(&self) -> Result<BTreeSet<String>, StractError> {
        self.enabled
            .read()
            .map(|set| set.clone())
            .map_err(|_| StractError::Store("memory store lock poisoned".into()))
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), StractError> {
        let mut set = self
            .enabled
            .write()
            .map_err(|_| StractError::Store("memory store lock poisoned".into()))?;
        if enabled {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
        Ok(())
    }
}

/// JSON file store: `{"pdfium": true, "mineru": false}`.
///
/// A missing file reads as the empty set. Writes go to a sibling temp file
/// that is then renamed over the target.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Default location: `$PDFSTRACT_CONFIG` or `<config dir>/pdfstract/libraries.json`.
    pub fn default_path() -> PathBuf {
        if let Ok(p) = std::env::var("PDFSTRACT_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("pdfstract")
            .join("libraries.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Map<String, Value>, StractError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(StractError::Store(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )))
            }
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StractError::Store(format!(
                "{} must contain a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(StractError::Store(format!(
                "cannot parse {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn save(&self, map: &Map<String, Value>) -> Result<(), StractError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .map_err(|e| StractError::Store(format!("cannot create {}: {e}", dir.display())))?;

        let body = serde_json::to_vec_pretty(map)
            .map_err(|e| StractError::Store(format!("cannot serialise settings: {e}")))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| StractError::Store(format!("cannot create temp file: {e}")))?;
        tmp.write_all(&body)
            .map_err(|e| StractError::Store(format!("cannot write settings: {e}")))?;
        tmp.persist(&self.path).map_err(|e| {
            StractError::Store(format!("cannot replace {}: {}", self.path.display(), e.error))
        })?;
        debug!("saved library settings to {}", self.path.display());
        Ok(())
    }
}

impl EnablementStore for JsonFileStore {
    fn enabled_names(&self) -> Result<BTreeSet<String>, StractError> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|(_, v)| v.as_bool().unwrap_or(false))
            .map(|(k, _)| k)
            .collect())
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), StractError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StractError::Store("settings write lock poisoned".into()))?;
        let mut map = self.load()?;
        map.insert(name.to_string(), Value::Bool(enabled));
        self.save(&map)
    }
}
