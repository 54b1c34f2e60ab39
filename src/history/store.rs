//! Namespaced JSON key-value persistence for the history service.

use crate::error::{Result, TransflowError};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Minimal persistent map of JSON values.
///
/// Every `set` is a full read-modify-write of one key; there is no
/// concurrency control beyond a single writer per process.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// All keys live in one JSON object on disk, rewritten atomically on each
/// `set` through a temp file in the same directory.
pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            match serde_json::from_str::<Value>(&contents) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    let backup = path.with_extension("json.corrupt");
                    warn!(
                        "Unreadable store {}, moving it to {} and starting empty",
                        path.display(),
                        backup.display()
                    );
                    fs::rename(&path, &backup)?;
                    Map::new()
                }
            }
        } else {
            Map::new()
        };

        debug!("Opened store {} ({} keys)", path.display(), data.len());
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, data: &Map<String, Value>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, data)?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .map_err(|e| TransflowError::Storage(format!("{}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut data = self.data.lock();
        let mut updated = data.clone();
        updated.insert(key.to_string(), value);
        self.flush(&updated)?;
        *data = updated;
        Ok(())
    }
}

/// Non-persistent store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.data.lock().insert(key.to_string(), value);
        Ok(())
    }
}
