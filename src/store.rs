//! Durable per-learner key/value storage.
//!
//! Values are JSON. `merge` shallow-merges object values and replaces anything else.
//! Two backends: in-memory (tests, no DATA_DIR) and a single JSON file on disk.

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
  sync::Mutex,
};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::StoreError;

pub trait KvStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
  fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
  fn merge(&self, key: &str, patch: Value) -> Result<Value, StoreError>;
}

fn merge_value(current: Option<Value>, patch: Value) -> Value {
  match (current, patch) {
    (Some(Value::Object(mut base)), Value::Object(patch)) => {
      base.extend(patch);
      Value::Object(base)
    }
    (_, patch) => patch,
  }
}

#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KvStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
    let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
    Ok(entries.get(key).cloned())
  }

  fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
    let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
    entries.insert(key.to_string(), value);
    Ok(())
  }

  fn merge(&self, key: &str, patch: Value) -> Result<Value, StoreError> {
    let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
    let merged = merge_value(entries.remove(key), patch);
    entries.insert(key.to_string(), merged.clone());
    Ok(merged)
  }
}

/// All keys in one pretty-printed JSON object, rewritten on every change.
/// Memory only moves on once the new file is in place.
pub struct JsonFileStore {
  path: PathBuf,
  entries: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
  pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
    let path = path.into();
    let entries = match std::fs::read_to_string(&path) {
      Ok(s) if s.trim().is_empty() => BTreeMap::new(),
      Ok(s) => serde_json::from_str(&s)?,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
      Err(e) => return Err(e.into()),
    };
    info!(target: "kidslearn_backend", path = %path.display(), keys = entries.len(), "Opened JSON store");
    Ok(Self { path, entries: Mutex::new(entries) })
  }

  fn flush(&self, entries: &BTreeMap<String, Value>) -> Result<(), StoreError> {
    if let Some(dir) = self.path.parent() {
      std::fs::create_dir_all(dir)?;
    }
    let tmp = self.path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
    std::fs::rename(&tmp, &self.path)?;
    debug!(target: "kidslearn_backend", path = %self.path.display(), keys = entries.len(), "Store flushed");
    Ok(())
  }
}

impl KvStore for JsonFileStore {
  fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
    let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
    Ok(entries.get(key).cloned())
  }

  fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
    let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
    let mut next = entries.clone();
    next.insert(key.to_string(), value);
    self.flush(&next)?;
    *entries = next;
    Ok(())
  }

  fn merge(&self, key: &str, patch: Value) -> Result<Value, StoreError> {
    let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
    let merged = merge_value(entries.get(key).cloned(), patch);
    let mut next = entries.clone();
    next.insert(key.to_string(), merged.clone());
    self.flush(&next)?;
    *entries = next;
    Ok(merged)
  }
}

/// JSON file store under DATA_DIR if set, otherwise memory only.
pub fn store_from_env() -> Box<dyn KvStore> {
  let Ok(dir) = std::env::var("DATA_DIR") else {
    info!(target: "kidslearn_backend", "DATA_DIR not set; learner history is kept in memory");
    return Box::new(MemoryStore::new());
  };
  match JsonFileStore::open(Path::new(&dir).join("learners.json")) {
    Ok(store) => Box::new(store),
    Err(e) => {
      warn!(target: "kidslearn_backend", %dir, error = %e, "Could not open JSON store; falling back to memory");
      Box::new(MemoryStore::new())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("kidslearn-{}-{}", name, uuid::Uuid::new_v4())).join("store.json")
  }

  #[test]
  fn merge_is_shallow_for_objects() {
    let store = MemoryStore::new();
    store.set("scores:ana", json!({ "letterMatching": 40, "other": 1 })).unwrap();
    let merged = store.merge("scores:ana", json!({ "letterMatching": 60 })).unwrap();
    assert_eq!(merged, json!({ "letterMatching": 60, "other": 1 }));
    assert_eq!(store.merge("list", json!([1])).unwrap(), json!([1]));
    assert_eq!(store.get("missing").unwrap(), None);
  }

  #[test]
  fn file_store_survives_reopen() {
    let path = temp_path("reopen");
    {
      let store = JsonFileStore::open(&path).unwrap();
      store.set("letter_matching:ana", json!([{ "attemptNumber": 1 }])).unwrap();
      store.merge("scores:ana", json!({ "letterMatching": 50 })).unwrap();
    }
    let store = JsonFileStore::open(&path).unwrap();
    assert_eq!(store.get("scores:ana").unwrap(), Some(json!({ "letterMatching": 50 })));
    assert_eq!(store.get("letter_matching:ana").unwrap().unwrap()[0]["attemptNumber"], 1);
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
  }

  #[test]
  fn failed_flush_keeps_memory_and_disk_in_step() {
    let path = temp_path("readonly");
    let store = JsonFileStore::open(&path).unwrap();
    store.set("scores:ana", json!({ "letterMatching": 40 })).unwrap();

    // A directory where the temp file should go makes the next write fail.
    let tmp = path.with_extension("json.tmp");
    std::fs::create_dir_all(&tmp).unwrap();
    assert!(store.set("scores:ana", json!({ "letterMatching": 90 })).is_err());
    assert!(store.merge("scores:ana", json!({ "letterMatching": 90 })).is_err());
    assert_eq!(store.get("scores:ana").unwrap(), Some(json!({ "letterMatching": 40 })));

    std::fs::remove_dir(&tmp).unwrap();
    let reopened = JsonFileStore::open(&path).unwrap();
    assert_eq!(reopened.get("scores:ana").unwrap(), Some(json!({ "letterMatching": 40 })));
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
  }

  #[test]
  fn corrupt_file_is_an_error() {
    let path = temp_path("corrupt");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(JsonFileStore::open(&path), Err(StoreError::Json(_))));
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
  }
}
