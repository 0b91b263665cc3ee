//! widget anchor persistence.
//!
//! the anchor is edge-relative (distance from the bottom and right edges of
//! the viewport). it survives reloads through a string-keyed store; every
//! failure on that path degrades to the default anchor or an in-session-only
//! position, never to a user-visible error.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const DEFAULT_STORAGE_KEY: &str = "assistant-widget-position";

/// on-screen anchor of the widget, in logical pixels.
///
/// also lives in the world as the *live* anchor resource.
#[derive(Resource, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnchorPosition {
    pub bottom: f32,
    pub right: f32,
}

impl AnchorPosition {
    pub const DEFAULT: Self = Self { bottom: 30.0, right: 30.0 };

    pub fn new(bottom: f32, right: f32) -> Self {
        Self { bottom, right }
    }

    fn is_well_formed(&self) -> bool {
        self.bottom.is_finite() && self.right.is_finite() && self.bottom >= 0.0 && self.right >= 0.0
    }
}

impl Default for AnchorPosition {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// durable string-keyed store (browser local storage, a directory, memory).
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// process-local store; the default in tests and when no durable store exists.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store poisoned".into()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// one `<key>.json` file per key under `root`.
#[cfg(not(target_arch = "wasm32"))]
pub struct FileStore {
    root: std::path::PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$XDG_DATA_HOME/bevy_assistant_widget` and friends.
    pub fn default_location() -> Option<Self> {
        dirs::data_local_dir().map(|d| Self::new(d.join("bevy_assistant_widget")))
    }

    fn path(&self, key: &str) -> std::path::PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(self.path(key), value)?;
        Ok(())
    }
}

/// `window.localStorage`. the handle is looked up per call since js values
/// cannot be held in a `Send` resource.
#[cfg(target_arch = "wasm32")]
#[derive(Default)]
pub struct LocalStorageStore;

#[cfg(target_arch = "wasm32")]
impl LocalStorageStore {
    fn storage() -> Result<web_sys::Storage, StorageError> {
        web_sys::window()
            .ok_or_else(|| StorageError::Unavailable("no window".into()))?
            .local_storage()
            .map_err(|e| StorageError::Unavailable(format!("{e:?}")))?
            .ok_or_else(|| StorageError::Unavailable("local storage disabled".into()))
    }
}

#[cfg(target_arch = "wasm32")]
impl KeyValueStore for LocalStorageStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Self::storage()?
            .get_item(key)
            .map_err(|e| StorageError::Unavailable(format!("{e:?}")))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        Self::storage()?
            .set_item(key, value)
            .map_err(|e| StorageError::Unavailable(format!("{e:?}")))
    }
}

/// loads and saves the anchor under a single key. never fails.
#[derive(Resource, Clone)]
pub struct PositionStore {
    backend: Arc<dyn KeyValueStore>,
    key: String,
}

impl PositionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self { backend, key: key.into() }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::default()), DEFAULT_STORAGE_KEY)
    }

    /// local storage on wasm, the user data dir on native (memory if that
    /// cannot be resolved).
    pub fn platform_default(key: impl Into<String>) -> Self {
        #[cfg(target_arch = "wasm32")]
        let backend: Arc<dyn KeyValueStore> = Arc::new(LocalStorageStore);

        #[cfg(not(target_arch = "wasm32"))]
        let backend: Arc<dyn KeyValueStore> = match FileStore::default_location() {
            Some(store) => Arc::new(store),
            None => {
                warn!(target: "bevy_assistant_widget", "no data dir; widget position will not persist");
                Arc::new(MemoryStore::default())
            }
        };

        Self::new(backend, key)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn load(&self) -> AnchorPosition {
        let raw = match self.backend.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return AnchorPosition::DEFAULT,
            Err(err) => {
                warn!(target: "bevy_assistant_widget", "position load failed: {err}");
                return AnchorPosition::DEFAULT;
            }
        };
        match serde_json::from_str::<AnchorPosition>(&raw) {
            Ok(p) if p.is_well_formed() => p,
            Ok(p) => {
                warn!(target: "bevy_assistant_widget", "discarding out-of-range position {p:?}");
                AnchorPosition::DEFAULT
            }
            Err(err) => {
                warn!(target: "bevy_assistant_widget", "discarding malformed position '{raw}': {err}");
                AnchorPosition::DEFAULT
            }
        }
    }

    pub fn save(&self, position: AnchorPosition) {
        let written = serde_json::to_string(&position)
            .map_err(StorageError::from)
            .and_then(|raw| self.backend.set(&self.key, &raw));
        if let Err(err) = written {
            warn!(target: "bevy_assistant_widget", "position save failed: {err}");
        }
    }
}
