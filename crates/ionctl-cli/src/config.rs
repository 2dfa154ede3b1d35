//! Session configuration.
//!
//! Configuration is loaded from several sources; later sources override
//! earlier ones:
//!
//! 1. Built-in defaults
//! 2. `config.yaml` in the state directory, or the file given with `--config`
//! 3. Environment variables (`IONCTL_*`)

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use ionctl_adapter_sim::TrapParameters;
use ionctl_services::LoadStrategy;

/// Configuration of a simulated session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Dataset file, `datasets.json` in the state directory when unset.
    pub datasets: Option<PathBuf>,

    /// Seed of the simulated trap.
    pub seed: u64,

    pub trap: TrapConfig,

    pub load: LoadConfig,
}

/// Simulated trap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrapConfig {
    pub ion_rate_hz: f64,
    pub background_rate_hz: f64,
    pub load_rate_hz: f64,
    /// Ions already trapped when the session starts.
    pub initial_ions: usize,
}

impl Default for TrapConfig {
    fn default() -> Self {
        let params = TrapParameters::default();
        Self {
            ion_rate_hz: params.ion_rate_hz,
            background_rate_hz: params.background_rate_hz,
            load_rate_hz: params.load_rate_hz,
            initial_ions: 0,
        }
    }
}

impl From<&TrapConfig> for TrapParameters {
    fn from(config: &TrapConfig) -> Self {
        Self {
            ion_rate_hz: config.ion_rate_hz,
            background_rate_hz: config.background_rate_hz,
            load_rate_hz: config.load_rate_hz,
            ..TrapParameters::default()
        }
    }
}

/// Defaults for `ionctl load`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub strategy: LoadStrategy,
    /// Time budget in seconds, the stored dataset value when unset.
    pub max_time: Option<f64>,
}

impl SessionConfig {
    /// Load the configuration from `path`, or from the state directory.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Some(path.to_path_buf())
            }
            None => dirs::home_dir()
                .map(|home| home.join(STATE_DIR).join("config.yaml"))
                .filter(|path| path.exists()),
        };

        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config: {}", path.display()))?;
                Self::from_yaml(&content)
                    .with_context(|| format!("Invalid config: {}", path.display()))?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(content)?)
    }

    /// Apply `IONCTL_*` overrides read through `var`.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(val) = var("IONCTL_DATASETS") {
            self.datasets = Some(PathBuf::from(val));
        }
        if let Some(val) = var("IONCTL_SEED") {
            self.seed = val
                .parse()
                .with_context(|| format!("IONCTL_SEED is not an integer: '{val}'"))?;
        }
        if let Some(val) = var("IONCTL_LOAD_RATE_HZ") {
            self.trap.load_rate_hz = val
                .parse()
                .with_context(|| format!("IONCTL_LOAD_RATE_HZ is not a number: '{val}'"))?;
        }
        if let Some(val) = var("IONCTL_LOAD_STRATEGY") {
            self.load.strategy = serde_yaml_ng::from_str(&val)
                .with_context(|| format!("Unknown load strategy: '{val}'"))?;
        }
        Ok(())
    }

    /// Dataset file of this session.
    pub fn dataset_path(&self) -> Result<PathBuf> {
        match &self.datasets {
            Some(path) => Ok(path.clone()),
            None => Ok(default_state_dir()?.join("datasets.json")),
        }
    }
}

const STATE_DIR: &str = ".ionctl";

/// Return the default state directory (~/.ionctl/).
pub fn default_state_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
    let state_dir = home.join(STATE_DIR);
    if !state_dir.exists() {
        fs::create_dir_all(&state_dir).with_context(|| {
            format!("Failed to create state directory: {}", state_dir.display())
        })?;
    }
    Ok(state_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = SessionConfig::from_yaml(
            "seed: 7\ntrap:\n  load_rate_hz: 100.0\nload:\n  strategy: monitor_fluorescence\n",
        )
        .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.trap.load_rate_hz, 100.0);
        assert_eq!(config.trap.ion_rate_hz, TrapConfig::default().ion_rate_hz);
        assert_eq!(config.load.strategy, LoadStrategy::MonitorFluorescence);
        assert_eq!(config.load.max_time, None);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(SessionConfig::from_yaml("\n").unwrap(), SessionConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SessionConfig::default();
        config
            .apply_env_overrides(|key| match key {
                "IONCTL_DATASETS" => Some("/tmp/ds.json".to_string()),
                "IONCTL_SEED" => Some("42".to_string()),
                "IONCTL_LOAD_STRATEGY" => Some("monitor_fluorescence".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.dataset_path().unwrap(), PathBuf::from("/tmp/ds.json"));
        assert_eq!(config.seed, 42);
        assert_eq!(config.load.strategy, LoadStrategy::MonitorFluorescence);
    }

    #[test]
    fn test_invalid_env_override() {
        let mut config = SessionConfig::default();
        let result = config.apply_env_overrides(|key| {
            (key == "IONCTL_SEED").then(|| "many".to_string())
        });
        assert!(result.is_err());
    }
}
