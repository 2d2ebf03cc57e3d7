// Configuration management for the PulseLink CLI
//
// Cross-platform config stored in:
// - macOS/Linux: ~/.config/pulselink/config.toml
// - Windows: %APPDATA%\pulselink\config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default port for listening (0 = random)
    pub listen_port: u16,

    /// Run the simulated wearable when starting a node
    pub simulate_wearable: bool,

    /// Seconds between simulated biometric readings
    pub sample_interval_secs: u64,

    /// Storage path override for the persisted display name
    pub storage_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: 0,
            simulate_wearable: true,
            sample_interval_secs: 3,
            storage_path: None,
        }
    }
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("pulselink");
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn data_dir() -> Result<PathBuf> {
        let dir = dirs::data_dir()
            .context("Could not determine data directory")?
            .join("pulselink");
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load the config, writing defaults on first run
    pub fn load() -> Result<Self> {
        let path = Self::config_file()?;
        if !path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_file()?;
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Where the display name lives
    pub fn storage_path(&self) -> Result<String> {
        if let Some(path) = &self.storage_path {
            return Ok(path.clone());
        }
        Ok(Self::data_dir()?.join("identity").display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.listen_port, 0);
        assert!(config.simulate_wearable);
        assert_eq!(config.sample_interval_secs, 3);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let contents = toml::to_string_pretty(&config).unwrap();
        let restored: Config = toml::from_str(&contents).unwrap();
        assert_eq!(restored.sample_interval_secs, config.sample_interval_secs);
    }
}
