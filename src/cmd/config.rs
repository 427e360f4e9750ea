//! Configuration view and validation commands (`taskboard config`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use taskboard::config::{CONFIG_FILE_NAME, TaskboardConfig};

use super::super::{Cli, ConfigCommands};
use super::load_config;

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Taskboard Configuration");
            println!("=======================");
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No {} found; using defaults.", config_path.display());
            }
            println!();

            let mut config = load_config(cli)?;
            if config.recommender.api_key.is_some() {
                config.recommender.api_key = Some("********".to_string());
            }
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("Effective values (with env overrides):");
            println!();
            println!("{}", rendered);
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {} found. Using defaults.", config_path.display());
            }
            let config = load_config(cli)?;
            let warnings = config.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE_NAME, config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }
            if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory {}", parent.display())
                })?;
            }

            TaskboardConfig::default().save(&config_path)?;

            println!("Created {} at {}", CONFIG_FILE_NAME, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] host, port, dev");
            println!("  - [auth] session_ttl_hours, allow_dev_sign_in");
            println!("  - [recommender] model, rate limits (key via GEMINI_API_KEY)");
            println!();
        }
    }

    Ok(())
}
