//! Shared helpers for CLI commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;

use ionctl_hal::{DatasetHandle, JsonFileDatasets};

use crate::config::SessionConfig;
use crate::system::SimSystem;

/// Open the dataset file at `path`.
pub fn open_datasets(path: &Path) -> Result<Arc<JsonFileDatasets>> {
    let store = JsonFileDatasets::open(path)
        .with_context(|| format!("Failed to open datasets at {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Build and initialize the simulated system of a session.
pub fn open_system(config: &SessionConfig) -> Result<SimSystem> {
    let path = config.dataset_path()?;
    let store: DatasetHandle = open_datasets(&path)?;
    println!("  Datasets: {}", style(path.display()).dim());

    let system = SimSystem::build(config, store)?;
    system.init()?;
    Ok(system)
}
