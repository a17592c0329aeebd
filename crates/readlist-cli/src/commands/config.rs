//! Config command handlers

use std::path::Path;

use anyhow::{bail, Context, Result};

use readlist_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config: &Config, config_path: &Path, output: &Output) -> Result<()> {
    match output.format {
        OutputFormat::Json => {
            output.print_json(&serde_json::json!({
                "account_storage_enabled": config.account_storage_enabled,
                "log_filter": config.log_filter,
                "config_file": config_path,
            }))?;
        }
        OutputFormat::Quiet => {
            println!("{}", config_path.display());
        }
        OutputFormat::Human => {
            println!("Configuration:");
            println!(
                "  account_storage_enabled: {}",
                config.account_storage_enabled
            );
            println!(
                "  log_filter:              {}",
                config.log_filter.as_deref().unwrap_or("(not set)")
            );
            println!();
            println!("Config file: {}", config_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(key: &str, value: &str, config_path: &Path, output: &Output) -> Result<()> {
    let mut config = Config::read_file(config_path).context("Failed to load configuration")?;
    apply_setting(&mut config, key, value)?;

    config
        .save_to_path(config_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply_setting(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "account_storage_enabled" => {
            config.account_storage_enabled = value
                .parse()
                .context("Invalid value for account_storage_enabled. Use 'true' or 'false'.")?;
        }
        "log_filter" => {
            config.log_filter = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.to_string())
            };
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: account_storage_enabled, log_filter",
                key
            );
        }
    }
    Ok(())
}
