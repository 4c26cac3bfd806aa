//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/ntdash/config.toml)
//! 3. Environment variables (NTDASH_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::sync::{SyncOptions, DEFAULT_PORT};

/// Environment variable prefix
const ENV_PREFIX: &str = "NTDASH";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Table server address (hostname or IP)
    #[serde(default = "default_server_address")]
    pub server_address: String,

    /// Table server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds to wait for the server to acknowledge a connection
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// How often a pending connection is checked
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Lift height shown as full scale
    #[serde(default = "default_max_lift_height")]
    pub max_lift_height: f64,

    /// Drive speed shown as full scale on the accelerometer
    #[serde(default = "default_max_rpm")]
    pub max_rpm: f64,

    /// Write logs here instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_address: default_server_address(),
            port: default_port(),
            connect_timeout_secs: default_connect_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            max_lift_height: default_max_lift_height(),
            max_rpm: default_max_rpm(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (NTDASH_SERVER_ADDRESS, NTDASH_PORT, ...)
    /// 2. Config file (~/.config/ntdash/config.toml or NTDASH_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load from `--config` if given, otherwise the default location
    pub fn load_with_cli_override(config_path: Option<&PathBuf>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
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
        // NTDASH_SERVER_ADDRESS
        if let Ok(val) = std::env::var(format!("{}_SERVER_ADDRESS", ENV_PREFIX)) {
            if !val.is_empty() {
                self.server_address = val;
            }
        }

        // NTDASH_PORT
        if let Some(port) = parse_env(&format!("{}_PORT", ENV_PREFIX)) {
            self.port = port;
        }

        // NTDASH_CONNECT_TIMEOUT_SECS
        if let Some(secs) = parse_env(&format!("{}_CONNECT_TIMEOUT_SECS", ENV_PREFIX)) {
            self.connect_timeout_secs = secs;
        }

        // NTDASH_LOG_FILE
        if let Ok(val) = std::env::var(format!("{}_LOG_FILE", ENV_PREFIX)) {
            self.log_file = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }
    }

    /// Save configuration to the default file
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
    /// Can be overridden with NTDASH_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ntdash")
            .join("config.toml")
    }

    /// Options for a [`SyncClient`](crate::sync::SyncClient)
    pub fn client_options(&self) -> SyncOptions {
        SyncOptions {
            port: self.port,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            ..SyncOptions::default()
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let val = std::env::var(name).ok()?;
    match val.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid number", name, val);
            None
        }
    }
}

fn default_server_address() -> String {
    "10.0.0.2".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_lift_height() -> f64 {
    7.0
}

fn default_max_rpm() -> f64 {
    10.0
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

    const ENV_VARS: &[&str] = &[
        "NTDASH_SERVER_ADDRESS",
        "NTDASH_PORT",
        "NTDASH_CONNECT_TIMEOUT_SECS",
        "NTDASH_LOG_FILE",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server_address, "10.0.0.2");
        assert_eq!(config.port, 1735);
        assert_eq!(config.connect_timeout_secs, 10);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_client_options() {
        let config = Config {
            connect_timeout_secs: 3,
            poll_interval_ms: 250,
            port: 5810,
            ..Config::default()
        };

        let options = config.client_options();
        assert_eq!(options.port, 5810);
        assert_eq!(options.connect_timeout, Duration::from_secs(3));
        assert_eq!(options.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_env_override_server() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("NTDASH_SERVER_ADDRESS", "roborio-1234-frc.local");
        env::set_var("NTDASH_PORT", "5810");
        config.apply_env_overrides();

        assert_eq!(config.server_address, "roborio-1234-frc.local");
        assert_eq!(config.port, 5810);
    }

    #[test]
    fn test_env_override_ignores_garbage() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("NTDASH_PORT", "eighty");
        env::set_var("NTDASH_CONNECT_TIMEOUT_SECS", "-1");
        config.apply_env_overrides();

        assert_eq!(config.port, 1735);
        assert_eq!(config.connect_timeout_secs, 10);
    }

    #[test]
    fn test_env_override_log_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("NTDASH_LOG_FILE", "/tmp/ntdash.log");
        config.apply_env_overrides();
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/ntdash.log")));

        // Empty string clears it
        env::set_var("NTDASH_LOG_FILE", "");
        config.apply_env_overrides();
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_load_from_str_fills_defaults() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            server_address = "10.12.34.2"
            max_lift_height = 6.5
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.server_address, "10.12.34.2");
        assert_eq!(config.max_lift_height, 6.5);
        assert_eq!(config.max_rpm, 10.0);
        assert_eq!(config.poll_interval_ms, 1000);
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config {
            server_address: "localhost".to_string(),
            log_file: Some(PathBuf::from("/var/log/ntdash.log")),
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_with_cli_override(Some(&path)).unwrap();
        assert_eq!(loaded.server_address, "localhost");
        assert_eq!(loaded.log_file, config.log_file);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.server_address, "10.0.0.2");
    }

    #[test]
    fn test_load_rejects_invalid_toml() {
        let _guard = EnvGuard::new(ENV_VARS);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();

        assert!(Config::load_from_path(&path).is_err());
    }
}
