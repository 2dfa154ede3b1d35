//! In-memory dataset store for simulation and tests.

use std::sync::Mutex;

use rustc_hash::FxHashMap;
use serde_json::Value;

use super::DatasetStore;
use crate::error::HalResult;

/// Volatile dataset store.
#[derive(Debug, Default)]
pub struct MemoryDatasets {
    values: Mutex<FxHashMap<String, Value>>,
}

impl MemoryDatasets {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DatasetStore for MemoryDatasets {
    fn get_raw(&self, key: &str) -> HalResult<Option<Value>> {
        let values = self
            .values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: Value) -> HalResult<()> {
        self.values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }

    fn keys(&self) -> HalResult<Vec<String>> {
        let values = self
            .values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut keys: Vec<_> = values.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
