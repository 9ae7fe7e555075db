//! Client-side persistence of the OSC destination list.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ClientError;

pub const CLIENT_LIST_KEY: &str = "oscclients";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

pub trait ClientListStore: Send + Sync {
    /// `Ok(None)` when nothing was ever stored.
    fn load(&self) -> Result<Option<String>, ClientError>;
    fn save(&self, list: &str) -> Result<(), ClientError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    oscclients: Option<String>,
    #[serde(flatten)]
    other: Map<String, Value>,
}

/// Stores the list under `oscclients` in a JSON settings file, preserving any
/// other keys already in the file.
#[derive(Debug, Clone)]
pub struct JsonFileClientListStore {
    path: PathBuf,
}

impl JsonFileClientListStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(SETTINGS_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_settings(&self) -> Result<PersistedSettings, ClientError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(PersistedSettings::default())
            }
            Err(source) => {
                return Err(ClientError::StoreIo {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if raw.trim().is_empty() {
            return Ok(PersistedSettings::default());
        }
        serde_json::from_str(&raw).map_err(|source| ClientError::StoreFormat {
            path: self.path.clone(),
            source,
        })
    }
}

impl ClientListStore for JsonFileClientListStore {
    fn load(&self) -> Result<Option<String>, ClientError> {
        Ok(self.read_settings()?.oscclients)
    }

    fn save(&self, list: &str) -> Result<(), ClientError> {
        let mut settings = self.read_settings()?;
        settings.oscclients = Some(list.to_string());

        let io_error = |source: io::Error| ClientError::StoreIo {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let serialized =
            serde_json::to_string_pretty(&settings).map_err(|source| ClientError::StoreFormat {
                path: self.path.clone(),
                source,
            })?;
        fs::write(&self.path, serialized).map_err(io_error)
    }
}

/// In-process store, for sessions that should not touch disk.
#[derive(Debug, Default)]
pub struct MemoryClientListStore {
    value: Mutex<Option<String>>,
}

impl MemoryClientListStore {
    pub fn new(initial: Option<String>) -> Self {
        Self {
            value: Mutex::new(initial),
        }
    }
}

impl ClientListStore for MemoryClientListStore {
    fn load(&self) -> Result<Option<String>, ClientError> {
        let guard = self.value.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(guard.clone())
    }

    fn save(&self, list: &str) -> Result<(), ClientError> {
        let mut guard = self.value.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(list.to_string());
        Ok(())
    }
}
