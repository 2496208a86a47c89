//! Config loading from disk.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::EngineConfig;

/// Default location: `<config dir>/pacsetup/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pacsetup").join("config.toml"))
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn from_default_location() -> anyhow::Result<Self> {
        let path = default_config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(Self::new(path))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load and validate the configuration; a missing file yields defaults.
    pub fn load(&self) -> anyhow::Result<EngineConfig> {
        if !self.config_path.exists() {
            return Ok(EngineConfig::default());
        }
        let content = std::fs::read_to_string(&self.config_path).with_context(|| {
            format!("Failed to read config file: {}", self.config_path.display())
        })?;
        let config: EngineConfig = toml::from_str(&content).with_context(|| {
            format!("Failed to parse config file: {}", self.config_path.display())
        })?;
        config.validate().with_context(|| {
            format!("Invalid configuration in {}", self.config_path.display())
        })?;
        Ok(config)
    }

    pub fn save(&self, config: &EngineConfig) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(config).context("Failed to serialize config to TOML")?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.config_path, content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;
        Ok(())
    }
}
