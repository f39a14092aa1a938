//! Config command - inspect configuration.

use anyhow::Result;
use clap::{Args, Subcommand};

use tierfetch_store::{default_config_dir, default_proxy_path, render_config, resolve_config_path};

use super::load_settings;
use crate::output::JsonFormatter;
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration.
    Show,

    /// Show configuration paths.
    Path,
}

/// Runs the config command.
pub fn run(args: &ConfigArgs, cli: &Cli) -> Result<ExitCode> {
    match &args.action {
        ConfigAction::Show => show_config(cli)?,
        ConfigAction::Path => show_paths(cli)?,
    }
    Ok(ExitCode::Success)
}

fn show_config(cli: &Cli) -> Result<()> {
    let (config, _) = load_settings(cli)?;

    match cli.format {
        OutputFormat::Text => print!("{}", render_config(&config)?),
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&config)?);
        }
    }

    Ok(())
}

fn show_paths(cli: &Cli) -> Result<()> {
    let config_dir = default_config_dir();
    let config_path = resolve_config_path(cli.config.as_deref());
    let proxy_path = cli.proxy_file.clone().unwrap_or_else(default_proxy_path);
    let (config, _) = load_settings(cli)?;
    let robots_path = config.robots.cache_file_path;

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration Paths");
            println!("{}", "─".repeat(40));
            println!();
            println!("Config dir:   {}", config_dir.display());
            println!("Config file:  {}", config_path.display());
            println!("Proxy file:   {}", proxy_path.display());
            println!("Robots cache: {}", robots_path.display());
        }
        OutputFormat::Json => {
            let paths = serde_json::json!({
                "config_dir": config_dir.display().to_string(),
                "config_file": config_path.display().to_string(),
                "proxy_file": proxy_path.display().to_string(),
                "robots_cache": robots_path.display().to_string(),
            });
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&paths)?);
        }
    }

    Ok(())
}
