//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/readlist/config.toml)
//! 3. Environment variables (READLIST_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix
const ENV_PREFIX: &str = "READLIST";

/// Log filter used when nothing else is configured
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Whether entries can live in a separate account-scoped store
    ///
    /// When disabled the factory builds a single-store model.
    #[serde(default = "default_account_storage_enabled")]
    pub account_storage_enabled: bool,

    /// `tracing` filter directive, e.g. `readlist_core=debug`
    #[serde(default)]
    pub log_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            account_storage_enabled: default_account_storage_enabled(),
            log_filter: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (READLIST_ACCOUNT_STORAGE, READLIST_LOG)
    /// 2. Config file (~/.config/readlist/config.toml or READLIST_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load only what the file at `path` says, ignoring the environment
    ///
    /// Use this before `save_to_path` so overrides are not persisted.
    pub fn read_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // READLIST_ACCOUNT_STORAGE
        if let Ok(val) = std::env::var(format!("{}_ACCOUNT_STORAGE", ENV_PREFIX)) {
            self.account_storage_enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }

        // READLIST_LOG
        if let Ok(val) = std::env::var(format!("{}_LOG", ENV_PREFIX)) {
            self.log_filter = if val.is_empty() { None } else { Some(val) };
        }
    }

    /// Filter directive for the log subscriber
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Save configuration to the default config file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with READLIST_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("readlist")
            .join("config.toml")
    }
}

fn default_account_storage_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &["READLIST_ACCOUNT_STORAGE", "READLIST_LOG", "READLIST_CONFIG"];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.account_storage_enabled);
        assert!(config.log_filter.is_none());
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_env_override_account_storage() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("READLIST_ACCOUNT_STORAGE", "false");
        config.apply_env_overrides();
        assert!(!config.account_storage_enabled);

        env::set_var("READLIST_ACCOUNT_STORAGE", "1");
        config.apply_env_overrides();
        assert!(config.account_storage_enabled);

        env::set_var("READLIST_ACCOUNT_STORAGE", "TRUE");
        config.account_storage_enabled = false;
        config.apply_env_overrides();
        assert!(config.account_storage_enabled);
    }

    #[test]
    fn test_env_override_log_filter() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("READLIST_LOG", "readlist_core=debug");
        config.apply_env_overrides();
        assert_eq!(config.log_filter(), "readlist_core=debug");

        // Empty string clears it
        env::set_var("READLIST_LOG", "");
        config.apply_env_overrides();
        assert!(config.log_filter.is_none());
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            account_storage_enabled = false
            log_filter = "debug"
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert!(!config.account_storage_enabled);
        assert_eq!(config.log_filter.as_deref(), Some("debug"));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config::load_from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config {
            account_storage_enabled: false,
            log_filter: Some("readlist_core=trace".to_string()),
        };
        config.save_to_path(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("account_storage_enabled"));

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_read_file_ignores_env_overrides() {
        let _guard = EnvGuard::new(ENV_VARS);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "account_storage_enabled = true\n").unwrap();

        env::set_var("READLIST_LOG", "trace");
        env::set_var("READLIST_ACCOUNT_STORAGE", "false");

        let from_file = Config::read_file(&path).unwrap();
        assert!(from_file.account_storage_enabled);
        assert!(from_file.log_filter.is_none());

        let effective = Config::load_from_path(&path).unwrap();
        assert!(!effective.account_storage_enabled);
        assert_eq!(effective.log_filter(), "trace");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let _guard = EnvGuard::new(ENV_VARS);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "account_storage_enabled = \"maybe\"").unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_config_file_path_override() {
        let _guard = EnvGuard::new(ENV_VARS);

        assert!(Config::config_file_path().ends_with("readlist/config.toml"));
        env::set_var("READLIST_CONFIG", "/tmp/readlist-test.toml");
        assert_eq!(
            Config::config_file_path(),
            PathBuf::from("/tmp/readlist-test.toml")
        );
    }
}
