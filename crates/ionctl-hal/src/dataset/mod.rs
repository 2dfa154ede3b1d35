//! System datasets.
//!
//! Calibration values and persisted state live in a string-keyed dataset
//! store. Keys are namespaced per module (`"system.pmt.active_channels"`)
//! through [`SystemDatasets`], which also implements the "get with
//! fallback" semantics: reading an absent key returns the fallback and
//! writes it back so that the store always documents the value in use.

mod json_file;
mod memory;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{HalError, HalResult};

pub use json_file::JsonFileDatasets;
pub use memory::MemoryDatasets;

/// Backing store for datasets.
pub trait DatasetStore: Send + Sync + std::fmt::Debug {
    /// Read a raw value. `Ok(None)` when the key is absent.
    fn get_raw(&self, key: &str) -> HalResult<Option<Value>>;

    /// Write a raw value.
    fn set_raw(&self, key: &str, value: Value) -> HalResult<()>;

    /// All stored keys, sorted.
    fn keys(&self) -> HalResult<Vec<String>>;
}

/// Shared dataset store.
pub type DatasetHandle = Arc<dyn DatasetStore>;

/// Namespaced, typed view over a [`DatasetStore`].
#[derive(Clone)]
pub struct SystemDatasets {
    store: DatasetHandle,
    prefix: String,
}

impl SystemDatasets {
    /// Root namespace of all system datasets.
    pub const ROOT: &'static str = "system";

    /// Create a view rooted at [`Self::ROOT`].
    pub fn new(store: DatasetHandle) -> Self {
        Self {
            store,
            prefix: Self::ROOT.to_string(),
        }
    }

    /// Create a view for a child namespace.
    pub fn child(&self, name: &str) -> Self {
        Self {
            store: Arc::clone(&self.store),
            prefix: format!("{}.{name}", self.prefix),
        }
    }

    /// Namespace prefix of this view.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Fully qualified key.
    pub fn key(&self, name: &str) -> String {
        format!("{}.{name}", self.prefix)
    }

    /// The underlying store.
    pub fn store(&self) -> &DatasetHandle {
        &self.store
    }

    /// Read a typed value.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> HalResult<Option<T>> {
        let key = self.key(name);
        match self.store.get_raw(&key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| HalError::Dataset(format!("Invalid value for '{key}': {e}"))),
            None => Ok(None),
        }
    }

    /// Read a typed value, storing `fallback` when the key is absent.
    pub fn get_or<T>(&self, name: &str, fallback: T) -> HalResult<T>
    where
        T: Serialize + DeserializeOwned,
    {
        if let Some(value) = self.get(name)? {
            return Ok(value);
        }
        tracing::debug!(key = %self.key(name), "Dataset absent, storing fallback");
        self.set(name, &fallback)?;
        Ok(fallback)
    }

    /// Write a typed value.
    pub fn set<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> HalResult<()> {
        let value = serde_json::to_value(value)?;
        self.store.set_raw(&self.key(name), value)
    }
}

impl std::fmt::Debug for SystemDatasets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemDatasets")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
