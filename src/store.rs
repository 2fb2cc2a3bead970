use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Key-value JSON persistence. Failures never propagate: a failed load looks
/// like a missing key, and a failed save is logged and dropped.
pub trait Store {
    fn load(&self, key: &str) -> Option<Value>;
    fn save(&self, key: &str, value: &Value);
}

/// One pretty-printed `<key>.json` file per key under `dir`.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: PathBuf) -> Self {
        JsonFileStore { dir }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Store for JsonFileStore {
    fn load(&self, key: &str) -> Option<Value> {
        let path = self.path(key);
        let data = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&data) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    fn save(&self, key: &str, value: &Value) {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            log::warn!("Failed to create data dir {}: {}", self.dir.display(), e);
            return;
        }
        let path = self.path(key);
        match serde_json::to_string_pretty(value) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    log::warn!("Failed to write {}: {}", path.display(), e);
                } else {
                    log::debug!("Saved {}", path.display());
                }
            }
            Err(e) => log::warn!("Failed to serialize {}: {}", key, e),
        }
    }
}

/// Shared in-memory store. Clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Value>>>,
    saves: Arc<Mutex<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).cloned()
    }

    pub fn insert(&self, key: &str, value: Value) {
        self.entries.lock().insert(key.to_string(), value);
    }
}

impl Store for MemoryStore {
    fn load(&self, key: &str) -> Option<Value> {
        self.get(key)
    }

    fn save(&self, key: &str, value: &Value) {
        *self.saves.lock() += 1;
        self.insert(key, value.clone());
    }
}
