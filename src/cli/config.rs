//! Config command - configuration utilities.

use std::path::Path;

use anyhow::Result;

use crate::cli::ConfigAction;
use crate::config::Config;

/// Run the config command.
pub fn run(action: ConfigAction, config_path: &Path) -> Result<()> {
    match action {
        ConfigAction::Validate => validate_config(config_path),
        ConfigAction::Show => show_config(config_path),
        ConfigAction::Path => {
            println!("{}", config_path.display());
            Ok(())
        }
    }
}

fn validate_config(config_path: &Path) -> Result<()> {
    println!();
    println!("Validating configuration...");
    println!("Path: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!("ERROR: Configuration file not found");
        println!();
        println!("Create one with 'rwmon template', or specify a path with --config-path");
        return Ok(());
    }

    match Config::load_from(config_path) {
        Ok(config) => {
            println!("Configuration is valid.");
            println!();
            println!("Summary:");
            println!(
                "  Webhook URL: http://localhost:{}{}",
                config.port().unwrap_or_default(),
                config.url_path()
            );
            println!(
                "  Rainmeter: {}",
                config.rainmeter_path().unwrap_or("(not configured)")
            );
            println!("  Commands: {}", config.commands().len());
            for cmd in config.commands() {
                println!(
                    "    - {} -> {} {}",
                    cmd.webhook_parameter_to_use_as_value
                        .as_deref()
                        .unwrap_or("(no parameter)"),
                    cmd.bang_command.as_deref().unwrap_or("(no bang)"),
                    cmd.measure_name.as_deref().unwrap_or_default()
                );
            }
            println!("  System tray icon: {}", config.show_system_tray_icon());
            println!("  Debug mode: {}", config.debug_mode());
        }
        Err(e) => {
            println!("ERROR: Configuration is invalid");
            println!();
            println!("Details: {}", e);
            println!();
            println!("Fix the configuration and run 'rwmon config validate' again.");
        }
    }

    println!();
    Ok(())
}

fn show_config(config_path: &Path) -> Result<()> {
    let config = Config::load_from(config_path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
