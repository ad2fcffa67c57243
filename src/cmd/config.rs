//! Configuration view and validation commands: `debugpilot config`.

use anyhow::{Context, Result};
use std::path::Path;

use debugpilot::pilot_config::{CONFIG_FILE, PILOT_DIR, PilotConfig, PilotToml};

use super::super::ConfigCommands;

fn print_toml(toml: &PilotToml) {
    println!("[oracle]");
    println!("  model = \"{}\"", toml.oracle.model);
    println!("  base_url = \"{}\"", toml.oracle.base_url);
    println!("  api_key_env = \"{}\"", toml.oracle.api_key_env);
    println!("  timeout_secs = {}", toml.oracle.timeout_secs);
    println!("  max_attempts = {}", toml.oracle.max_attempts);
    println!("  backoff_ms = {}", toml.oracle.backoff_ms);
    println!();
    println!("[paths]");
    println!("  result_dir = \"{}\"", toml.paths.result_dir.display());
    println!("  benchmark_dir = \"{}\"", toml.paths.benchmark_dir.display());
    println!("  prompt_dir = \"{}\"", toml.paths.prompt_dir.display());
    println!();
    println!("[trace]");
    println!("  read_scope = {}", toml.trace.read_scope);
    println!("  write_scope = {}", toml.trace.write_scope);
    println!();
    println!("[interaction]");
    println!("  max_user_turns = {}", toml.interaction.max_user_turns);
    println!();
}

pub fn cmd_config(workspace_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let pilot_dir = workspace_dir.join(PILOT_DIR);
    let config_path = pilot_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("debugpilot Configuration");
            println!("========================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                print_toml(&PilotToml::load(&config_path)?);
            } else {
                println!("No pilot.toml found at {}", config_path.display());
                println!();
                println!("Using default configuration:");
                print_toml(&PilotToml::default());
                println!("Run 'debugpilot config init' to create a pilot.toml file.");
                println!();
            }

            // Effective values (with env overrides)
            let config = PilotConfig::new(workspace_dir.to_path_buf())?;
            let settings = config.oracle_settings();
            println!("Effective values (with env overrides):");
            println!("  model = \"{}\"", settings.model);
            println!("  base_url = \"{}\"", settings.base_url);
            println!(
                "  api_key = {}",
                if settings.api_key.is_some() { "set" } else { "not set" }
            );
            println!("  result_dir = {}", config.result_dir().display());
            println!("  benchmark_dir = {}", config.benchmark_dir().display());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No pilot.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = PilotToml::load(&config_path)?;
            let warnings = toml.validate();

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
                println!("pilot.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&pilot_dir)
                .with_context(|| format!("Failed to create {}", pilot_dir.display()))?;
            PilotToml::default().save(&config_path)?;

            println!("Created pilot.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [oracle] model, base_url, api_key_env");
            println!("  - [paths] result_dir, benchmark_dir, prompt_dir");
            println!("  - [trace] read_scope, write_scope");
            println!();
        }
    }

    Ok(())
}
