use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::protocol::Size;

/// Terminal session settings, persisted as YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Window title.
    #[serde(default = "default_title")]
    pub title: String,

    /// Timer tick interval in milliseconds; 0 disables the timer.
    #[serde(default = "default_timer_interval_ms")]
    pub timer_interval_ms: u64,

    /// Surface size when the window first opens.
    #[serde(default = "default_initial_size")]
    pub initial_size: Size,

    /// Log at debug level instead of info.
    #[serde(default)]
    pub debug_logging: bool,
}

fn default_title() -> String {
    "Graphics Terminal".to_string()
}

fn default_timer_interval_ms() -> u64 {
    250
}

fn default_initial_size() -> Size {
    Size::new(640, 480)
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            timer_interval_ms: default_timer_interval_ms(),
            initial_size: default_initial_size(),
            debug_logging: false,
        }
    }
}

impl TerminalConfig {
    /// Timer interval as a duration, or `None` when the timer is disabled.
    pub fn timer_interval(&self) -> Option<Duration> {
        if self.timer_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.timer_interval_ms))
        }
    }
}

/// Configuration manager for loading and saving the YAML settings file.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing the settings file
    ///
    /// # Returns
    /// A new ConfigManager instance
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        // Create config directory if it doesn't exist
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join("Terminal Settings.yaml"),
            config_dir,
        })
    }

    /// Load the configuration file.
    ///
    /// # Returns
    /// The loaded TerminalConfig, or defaults if the file doesn't exist
    pub fn load(&self) -> Result<TerminalConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
            return Ok(TerminalConfig::default());
        }

        let file_contents = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: TerminalConfig = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        tracing::info!("Loaded config from {}", self.config_path);
        Ok(config)
    }

    /// Save the configuration file.
    ///
    /// # Arguments
    /// * `config` - The TerminalConfig to save
    pub fn save(&self, config: &TerminalConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&config_path).unwrap();
        (manager, temp_dir)
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();

        let loaded = manager.load().unwrap();
        assert_eq!(loaded, TerminalConfig::default());
        assert_eq!(loaded.timer_interval_ms, 250);
    }

    #[test]
    fn test_load_save_round_trip() {
        let (manager, _temp_dir) = create_test_config_manager();

        let config = TerminalConfig {
            title: "Scope View".to_string(),
            timer_interval_ms: 100,
            initial_size: Size::new(1024, 768),
            debug_logging: true,
        };
        manager.save(&config).unwrap();

        let loaded = manager.load().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();

        fs::write(
            manager.config_dir().join("Terminal Settings.yaml"),
            "title: Partial\n",
        )
        .unwrap();

        let loaded = manager.load().unwrap();
        assert_eq!(loaded.title, "Partial");
        assert_eq!(loaded.timer_interval_ms, 250);
        assert_eq!(loaded.initial_size, Size::new(640, 480));
    }

    #[test]
    fn test_zero_interval_disables_timer() {
        let config = TerminalConfig {
            timer_interval_ms: 0,
            ..TerminalConfig::default()
        };
        assert!(config.timer_interval().is_none());
        assert_eq!(
            TerminalConfig::default().timer_interval(),
            Some(Duration::from_millis(250))
        );
    }
}
