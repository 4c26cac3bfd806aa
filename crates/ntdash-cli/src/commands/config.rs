//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use ntdash_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "server_address": config.server_address,
                    "port": config.port,
                    "connect_timeout_secs": config.connect_timeout_secs,
                    "poll_interval_ms": config.poll_interval_ms,
                    "max_lift_height": config.max_lift_height,
                    "max_rpm": config.max_rpm,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}:{}", config.server_address, config.port);
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  server_address:       {}", config.server_address);
            println!("  port:                 {}", config.port);
            println!("  connect_timeout_secs: {}", config.connect_timeout_secs);
            println!("  poll_interval_ms:     {}", config.poll_interval_ms);
            println!("  max_lift_height:      {}", config.max_lift_height);
            println!("  max_rpm:              {}", config.max_rpm);
            println!(
                "  log_file:             {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "server_address" => {
            if value.trim().is_empty() {
                bail!("server_address cannot be empty");
            }
            config.server_address = value.trim().to_string();
        }
        "port" => {
            config.port = value
                .parse()
                .context("Invalid value for port. Use a number between 0 and 65535.")?;
        }
        "connect_timeout_secs" => {
            config.connect_timeout_secs = value
                .parse()
                .context("Invalid value for connect_timeout_secs. Use a whole number.")?;
        }
        "poll_interval_ms" => {
            config.poll_interval_ms = value
                .parse()
                .context("Invalid value for poll_interval_ms. Use a whole number.")?;
        }
        "max_lift_height" => {
            config.max_lift_height = value
                .parse()
                .context("Invalid value for max_lift_height. Use a number.")?;
        }
        "max_rpm" => {
            config.max_rpm = value
                .parse()
                .context("Invalid value for max_rpm. Use a number.")?;
        }
        "log_file" => {
            config.log_file = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.into())
            };
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: server_address, port, connect_timeout_secs, poll_interval_ms, \
                 max_lift_height, max_rpm, log_file",
                key
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_apply_known_keys() {
        let mut config = Config::default();
        apply(&mut config, "server_address", "roborio-1234-frc.local").unwrap();
        apply(&mut config, "port", "5810").unwrap();
        apply(&mut config, "max_rpm", "12.5").unwrap();
        apply(&mut config, "log_file", "/tmp/ntdash.log").unwrap();

        assert_eq!(config.server_address, "roborio-1234-frc.local");
        assert_eq!(config.port, 5810);
        assert_eq!(config.max_rpm, 12.5);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/ntdash.log")));

        apply(&mut config, "log_file", "none").unwrap();
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_apply_rejects_bad_input() {
        let mut config = Config::default();
        assert!(apply(&mut config, "port", "not-a-port").is_err());
        assert!(apply(&mut config, "port", "70000").is_err());
        assert!(apply(&mut config, "server_address", "  ").is_err());
        assert!(apply(&mut config, "favorite_color", "blue").is_err());
        assert_eq!(config.port, Config::default().port);
    }

    #[test]
    fn test_set_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let output = Output::new(OutputFormat::Quiet);

        set(
            "connect_timeout_secs".to_string(),
            "3".to_string(),
            Some(&path),
            &output,
        )
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("connect_timeout_secs = 3"));
    }
}
