use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_BACKEND_URL: &str = "PAGECHAT_BACKEND_URL";
pub const ENV_TYPING_DELAY_MS: &str = "PAGECHAT_TYPING_DELAY_MS";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub backend_url: String,
    pub typing_delay_ms: u64,
    pub history_limit: Option<usize>,
    /// Page the panel asks about when none is given on the command line
    pub default_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000".to_string(),
            typing_delay_ms: 20,
            history_limit: Some(20),
            default_url: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from the config directory, falling back to defaults when the file
    /// does not exist, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::get_config_path()?)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Write the defaults out so there is a file to edit. Leaves an existing
    /// file alone.
    pub fn write_default_if_missing() -> Result<bool, ConfigError> {
        let path = Self::get_config_path()?;
        if path.exists() {
            return Ok(false);
        }
        Self::new().save_to(&path)?;
        Ok(true)
    }

    /// Apply environment overrides. An invalid value is logged and skipped;
    /// everything else loaded so far stays as it was. Returns the overrides
    /// that were rejected.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Vec<ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut rejected = Vec::new();

        if let Some(url) = lookup(ENV_BACKEND_URL).filter(|u| !u.trim().is_empty()) {
            self.backend_url = url;
        }

        if let Some(value) = lookup(ENV_TYPING_DELAY_MS) {
            match value.trim().parse() {
                Ok(delay) => self.typing_delay_ms = delay,
                Err(_) => rejected.push(ConfigError::InvalidEnv { name: ENV_TYPING_DELAY_MS, value }),
            }
        }

        for err in &rejected {
            tracing::warn!(error = %err, "ignoring environment override");
        }
        rejected
    }

    pub fn typing_delay(&self) -> Duration {
        Duration::from_millis(self.typing_delay_ms)
    }

    pub fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;

        Ok(config_dir.join("pagechat").join("config.json"))
    }

    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("pagechat"))
    }

    /// File holding the persisted key-value store
    pub fn storage_path() -> Option<PathBuf> {
        Self::data_dir().map(|d| d.join("storage.json"))
    }

    pub fn log_path() -> Option<PathBuf> {
        Self::data_dir().map(|d| d.join("pagechat.log"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.backend_url, "http://localhost:8000");
        assert_eq!(config.history_limit, Some(20));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "typing_delay_ms": 5 }"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.typing_delay_ms, 5);
        assert_eq!(config.backend_url, "http://localhost:8000");
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            default_url: Some("https://example.com".to_string()),
            history_limit: None,
            ..Config::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        let rejected = config.apply_overrides(|name| match name {
            ENV_BACKEND_URL => Some("http://rag.internal:9000".to_string()),
            ENV_TYPING_DELAY_MS => Some("0".to_string()),
            _ => None,
        });
        assert!(rejected.is_empty());

        assert_eq!(config.backend_url, "http://rag.internal:9000");
        assert_eq!(config.typing_delay(), Duration::ZERO);
    }

    #[test]
    fn test_bad_delay_override_keeps_file_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "backend_url": "http://rag.lan:8000", "typing_delay_ms": 7, "history_limit": 5 }"#,
        )
        .unwrap();

        let mut config = Config::load_from(&path).unwrap();
        let rejected = config.apply_overrides(|name| {
            (name == ENV_TYPING_DELAY_MS).then(|| "fast".to_string())
        });

        assert_eq!(rejected.len(), 1);
        assert!(matches!(rejected[0], ConfigError::InvalidEnv { name: ENV_TYPING_DELAY_MS, .. }));
        assert_eq!(config.backend_url, "http://rag.lan:8000");
        assert_eq!(config.typing_delay_ms, 7);
        assert_eq!(config.history_limit, Some(5));
    }
}
