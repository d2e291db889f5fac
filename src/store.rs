use crate::error::StorageError;
use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
#[cfg(test)]
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const SPECIES_KEY: &str = "aquavault_species_v2";
pub const REMOTE_CONFIG_KEY: &str = "aquavault_github_cfg_v1";
pub const ABOUT_KEY: &str = "aquavault_about_v1";

/// Durable string-valued storage addressed by key.
///
/// Every call is synchronous and whole-value: a `set` replaces whatever was
/// stored under the key.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Load and decode the value under `key`.
///
/// Missing keys and unreadable values both come back as `None`; the latter is
/// logged.
pub fn load<T: DeserializeOwned>(store: &impl KeyValueStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!("Failed to read {} from storage: {}", key, e);
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring unreadable value under {}: {}", key, e);
            None
        }
    }
}

/// Encode and write `value` under `key`. Failures are logged and reported
/// through the return value only so callers can carry on.
pub fn save<T: Serialize + ?Sized>(store: &mut impl KeyValueStore, key: &str, value: &T) -> bool {
    let result = serde_json::to_string(value)
        .map_err(StorageError::from)
        .and_then(|raw| store.set(key, &raw));
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to save {}: {}", key, e);
            false
        }
    }
}

/// Free-text "about" note, stored raw.
pub fn load_about(store: &impl KeyValueStore) -> Option<String> {
    match store.get(ABOUT_KEY) {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to read about note: {}", e);
            None
        }
    }
}

pub fn save_about(store: &mut impl KeyValueStore, text: &str) -> bool {
    match store.set(ABOUT_KEY, text) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to save about note: {}", e);
            false
        }
    }
}

/// One file per key inside a data directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let target = self.path_for(key);

        // Unique temp file beside the target, removed on drop if any step fails.
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;

        debug!("Flushed {} ({} bytes)", key, value.len());
        Ok(())
    }
}

/// In-memory store for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
    pub fail_writes: bool,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(std::io::Error::other(format!("write rejected for {}", key)).into());
        }
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
