//! Datasets command implementation.

use std::collections::BTreeMap;

use anyhow::Result;
use console::style;
use serde_json::Value;

use ionctl_hal::DatasetStore;

use super::common::open_datasets;
use crate::config::SessionConfig;

/// Execute the datasets command: print stored values whose key starts with
/// `prefix`.
pub fn execute(config: &SessionConfig, prefix: Option<&str>, format: &str) -> Result<()> {
    let path = config.dataset_path()?;
    let store = open_datasets(&path)?;

    let mut entries = BTreeMap::new();
    for key in store.keys()? {
        if prefix.is_some_and(|p| !key.starts_with(p)) {
            continue;
        }
        if let Some(value) = store.get_raw(&key)? {
            entries.insert(key, value);
        }
    }

    match format.to_lowercase().as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        "table" => {
            println!(
                "{} {} dataset(s) in {}",
                style("→").cyan().bold(),
                entries.len(),
                style(path.display()).dim()
            );
            for (key, value) in &entries {
                println!("  {:<45} {}", style(key).cyan(), render(value));
            }
        }
        other => anyhow::bail!("Unknown format: '{other}'. Available: table, json"),
    }
    Ok(())
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
