//! JSON file-backed dataset store.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::DatasetStore;
use crate::error::HalResult;

/// On-disk layout of the dataset file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DatasetFile {
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    values: FxHashMap<String, Value>,
}

/// Dataset store persisted as a single JSON file.
///
/// The file is read once on open and kept in an in-memory cache. Every
/// write updates the cache and rewrites the file, so values written by an
/// interrupted session are not lost.
#[derive(Debug)]
pub struct JsonFileDatasets {
    path: PathBuf,
    cache: RwLock<FxHashMap<String, Value>>,
}

impl JsonFileDatasets {
    /// Open (or create) the dataset file at `path`.
    pub fn open(path: impl AsRef<Path>) -> HalResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let values = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => FxHashMap::default(),
            Ok(content) => serde_json::from_str::<DatasetFile>(&content)?.values,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FxHashMap::default(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), entries = values.len(), "Opened dataset file");

        Ok(Self {
            path,
            cache: RwLock::new(values),
        })
    }

    /// Location of the dataset file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &FxHashMap<String, Value>) -> HalResult<()> {
        let file = DatasetFile {
            updated_at: Some(Utc::now()),
            values: values.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl DatasetStore for JsonFileDatasets {
    fn get_raw(&self, key: &str) -> HalResult<Option<Value>> {
        let cache = self
            .cache
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(cache.get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: Value) -> HalResult<()> {
        let mut cache = self
            .cache
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        cache.insert(key.to_string(), value);
        self.flush(&cache)
    }

    fn keys(&self) -> HalResult<Vec<String>> {
        let cache = self
            .cache
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut keys: Vec<_> = cache.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datasets.json");

        {
            let store = JsonFileDatasets::open(&path).unwrap();
            store
                .set_raw("system.dds.dds_latency_mu", Value::from(-1248))
                .unwrap();
            store.set_raw("system.num_ions", Value::from(2)).unwrap();
        }

        let store = JsonFileDatasets::open(&path).unwrap();
        assert_eq!(
            store.get_raw("system.dds.dds_latency_mu").unwrap(),
            Some(Value::from(-1248))
        );
        assert_eq!(store.keys().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileDatasets::open(dir.path().join("nested/datasets.json")).unwrap();
        assert!(store.keys().unwrap().is_empty());
        assert_eq!(store.get_raw("system.anything").unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datasets.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(JsonFileDatasets::open(&path).is_err());
    }
}
