use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::models::error::StorageError;

/// A single persisted preference value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreferenceValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

/// Flat key-value store for small pieces of persisted state.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<PreferenceValue>;

    fn set(&self, key: &str, value: PreferenceValue) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;

    fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some(PreferenceValue::Bool(true)))
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(PreferenceValue::Int(v)) => Some(v),
            _ => None,
        }
    }

    fn get_text(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(PreferenceValue::Text(v)) => Some(v),
            _ => None,
        }
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), StorageError> {
        self.set(key, PreferenceValue::Bool(value))
    }

    fn set_int(&self, key: &str, value: i64) -> Result<(), StorageError> {
        self.set(key, PreferenceValue::Int(value))
    }

    fn set_text(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.set(key, PreferenceValue::Text(value.to_string()))
    }
}

/// Process-lifetime store, for tests and hosts without persistence.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<BTreeMap<String, PreferenceValue>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<PreferenceValue> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: PreferenceValue) -> Result<(), StorageError> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Preferences persisted as a pretty-printed JSON object.
///
/// The whole file is rewritten on every change (via a sibling temp file and
/// rename, so a crash never leaves a truncated file behind).
#[derive(Debug)]
pub struct JsonFilePreferences {
    path: PathBuf,
    values: Mutex<BTreeMap<String, PreferenceValue>>,
}

impl JsonFilePreferences {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let values = if path.exists() {
            let json = fs::read_to_string(&path)
                .map_err(|e| StorageError(format!("failed to read preferences: {}", e)))?;
            serde_json::from_str(&json)
                .map_err(|e| StorageError(format!("failed to parse preferences: {}", e)))?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, PreferenceValue>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StorageError(format!("failed to create directory: {}", e)))?;
        }
        let json = serde_json::to_string_pretty(values)
            .map_err(|e| StorageError(format!("failed to serialize preferences: {}", e)))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| StorageError(format!("failed to write preferences: {}", e)))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| StorageError(format!("failed to replace preferences: {}", e)))?;
        Ok(())
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn get(&self, key: &str) -> Option<PreferenceValue> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: PreferenceValue) -> Result<(), StorageError> {
        let mut values = self.values.lock();
        values.insert(key.to_string(), value);
        self.persist(&values)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock();
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }
}
