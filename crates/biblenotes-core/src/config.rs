use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::reconcile::SyncTuning;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    /// Margin changes at or below this many pixels are ignored
    pub sync_hysteresis_px: Option<f32>,
    /// Margin application is deferred for this long after a chapter switch
    pub sync_stabilize_ms: Option<u64>,
    /// Acceptable residual top-of-row misalignment between panes
    pub sync_top_tolerance_px: Option<f32>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".to_string(),
            sync_hysteresis_px: None,
            sync_stabilize_ms: None,
            sync_top_tolerance_px: None,
        }
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        Ok(())
    }

    pub fn sync_tuning(&self) -> SyncTuning {
        let defaults = SyncTuning::default();
        SyncTuning {
            hysteresis_px: self.sync_hysteresis_px.unwrap_or(defaults.hysteresis_px),
            stabilize_ms: self.sync_stabilize_ms.unwrap_or(defaults.stabilize_ms),
            top_tolerance_px: self
                .sync_top_tolerance_px
                .unwrap_or(defaults.top_tolerance_px),
        }
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("biblenotes").join("config.json"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fall_back_to_production_tuning() {
        let config = Config::new();
        let tuning = config.sync_tuning();
        assert_eq!(tuning, SyncTuning::default());
    }

    #[test]
    fn overridden_tuning_wins() {
        let config = Config {
            sync_hysteresis_px: Some(2.5),
            sync_stabilize_ms: Some(500),
            ..Config::new()
        };
        let tuning = config.sync_tuning();
        assert_eq!(tuning.hysteresis_px, 2.5);
        assert_eq!(tuning.stabilize_ms, 500);
        assert_eq!(tuning.top_tolerance_px, SyncTuning::default().top_tolerance_px);
    }
}
