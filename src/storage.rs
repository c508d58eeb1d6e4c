// Key-value blob store and the persisted-state mirror built on top of it

use crate::errors::RideError;
use log::{debug, error};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const TEMP_POSITIONS_KEY: &str = "gps_temp_positions";
pub const TEMP_STARTED_AT_KEY: &str = "gps_temp_started_at";
pub const SAVED_SESSIONS_KEY: &str = "gps_saved_sessions";
pub const FUEL_TANK_CAPACITY_KEY: &str = "fuel_tank_capacity";
pub const FUEL_AVG_MILEAGE_KEY: &str = "fuel_avg_mileage";
pub const FUEL_CURRENT_KEY: &str = "fuel_current";

/// Trait defining the interface of the blob store that mirrors application state
pub trait KeyValueStore {
    /// Load the blob stored under `key`, `None` if nothing was stored yet
    fn load(&self, key: &str) -> Result<Option<String>, RideError>;

    /// Store `blob` under `key`, replacing any previous value
    fn save(&mut self, key: &str, blob: &str) -> Result<(), RideError>;
}

/// File-based store, one `<key>.json` file per key
pub struct FileKeyValueStore {
    storage_path: PathBuf,
}

impl FileKeyValueStore {
    /// Create a store rooted at `storage_path`, creating the directory if needed
    pub fn new(storage_path: PathBuf) -> Result<Self, RideError> {
        if !storage_path.exists() {
            fs::create_dir_all(&storage_path).map_err(|e| RideError::StorageIOError {
                key: storage_path.display().to_string(),
                source: e,
            })?;
        }
        Ok(Self { storage_path })
    }

    /// Create the store in the default application data directory
    pub fn new_default() -> Result<Self, RideError> {
        Self::new(Self::default_storage_path()?)
    }

    pub fn default_storage_path() -> Result<PathBuf, RideError> {
        let app_data_dir = dirs::data_dir().ok_or(RideError::NoDataDir)?;
        Ok(app_data_dir.join("ridelog").join("store"))
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// Keys are used verbatim in file names, anything else than [A-Za-z0-9_-] is replaced
    fn file_path_for_key(&self, key: &str) -> PathBuf {
        let normalized: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.storage_path.join(format!("{}.json", normalized))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn load(&self, key: &str) -> Result<Option<String>, RideError> {
        let file_path = self.file_path_for_key(key);
        if !file_path.exists() {
            return Ok(None);
        }
        let blob = fs::read_to_string(&file_path).map_err(|e| RideError::StorageIOError {
            key: key.to_string(),
            source: e,
        })?;
        Ok(Some(blob))
    }

    fn save(&mut self, key: &str, blob: &str) -> Result<(), RideError> {
        let file_path = self.file_path_for_key(key);
        // write next to the target and rename so a crash never leaves half a blob
        let tmp_path = file_path.with_extension("json.tmp");
        fs::write(&tmp_path, blob)
            .and_then(|_| fs::rename(&tmp_path, &file_path))
            .map_err(|e| RideError::StorageIOError {
                key: key.to_string(),
                source: e,
            })
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn load(&self, key: &str) -> Result<Option<String>, RideError> {
        (**self).load(key)
    }

    fn save(&mut self, key: &str, blob: &str) -> Result<(), RideError> {
        (**self).save(key, blob)
    }
}

/// In-memory store for tests and for running without a data directory
#[derive(Default, Debug, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, RideError> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, blob: &str) -> Result<(), RideError> {
        self.entries.insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

/// A value mirrored to a [`KeyValueStore`] entry.
///
/// The value is read from the store once on `load` and flushed after every mutation.
/// Store failures are logged and never lose the in-memory value.
#[derive(Debug, Clone)]
pub struct PersistentState<T> {
    key: &'static str,
    value: T,
}

impl<T: Serialize + DeserializeOwned> PersistentState<T> {
    /// Initialise from the store, falling back to `default` when the entry is
    /// missing or unreadable
    pub fn load(store: &dyn KeyValueStore, key: &'static str, default: T) -> Self {
        let value = match store.load(key) {
            Ok(Some(blob)) => match serde_json::from_str(&blob) {
                Ok(value) => value,
                Err(e) => {
                    error!("Error reading store key \"{}\": {}", key, e);
                    default
                }
            },
            Ok(None) => {
                debug!("No stored value for \"{}\", using default", key);
                default
            }
            Err(e) => {
                error!("Error reading store key \"{}\": {}", key, e);
                default
            }
        };
        Self { key, value }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Replace the value and flush it. A failed flush is logged, the new value is kept.
    pub fn set(&mut self, store: &mut dyn KeyValueStore, value: T) {
        self.value = value;
        self.flush(store);
    }

    /// Mutate the value in place and flush it
    pub fn update(&mut self, store: &mut dyn KeyValueStore, f: impl FnOnce(&mut T)) {
        f(&mut self.value);
        self.flush(store);
    }

    /// Replace the value only if it could be written to the store
    pub fn try_set(&mut self, store: &mut dyn KeyValueStore, value: T) -> Result<(), RideError> {
        write_entry(store, self.key, &value)?;
        self.value = value;
        Ok(())
    }

    fn flush(&self, store: &mut dyn KeyValueStore) {
        if let Err(e) = write_entry(store, self.key, &self.value) {
            error!("Error setting store key \"{}\": {}", self.key, e);
        }
    }
}

fn write_entry<T: Serialize>(
    store: &mut dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), RideError> {
    let blob = serde_json::to_string(value).map_err(|e| RideError::StorageSerializeError {
        key: key.to_string(),
        source: e,
    })?;
    store.save(key, &blob)
}
