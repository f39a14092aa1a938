// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! tierfetch CLI - two-tier web fetching from the command line.
//!
//! # Examples
//!
//! ```bash
//! # Fetch a few URLs, escalating to the browser when HTTP falls short
//! tierfetch run https://example.com/ https://example.org/
//!
//! # Read URLs from a file and emit JSON lines
//! tierfetch run --input urls.txt --format json
//!
//! # HTTP only
//! tierfetch run --input - --no-browser < urls.txt
//!
//! # Check the robots decision for an origin
//! tierfetch robots https://example.com/some/page
//!
//! # Show the effective configuration
//! tierfetch config show
//! ```

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::{config, robots, run};

// ============================================================================
// CLI Definition
// ============================================================================

/// tierfetch CLI - two-tier web fetching.
#[derive(Parser)]
#[command(name = "tierfetch")]
#[command(about = "Fetch URLs over HTTP, escalating to a headless browser when needed")]
#[command(long_about = r#"
tierfetch fetches each URL with a plain HTTP client first. URLs whose
response looks unusable (an error, a timeout, or a suspiciously small page)
are retried once in a pooled headless Chromium session, up to a per-run
ceiling. robots.txt is honored per origin and cached on disk.

Examples:
  tierfetch run https://example.com/       # Fetch one URL
  tierfetch run --input urls.txt           # URLs from a file
  tierfetch run --format json --no-browser # JSON lines, HTTP only
  tierfetch robots https://example.com/    # Robots decision for an origin
  tierfetch config path                    # Where files live
"#)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output (ignored for streamed records).
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Configuration file (defaults to the per-user config dir).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Proxy descriptor file (defaults to the per-user config dir).
    #[arg(long, global = true)]
    pub proxy_file: Option<PathBuf>,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (no logging).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Fetch URLs through the two-tier pipeline.
    #[command(visible_alias = "r")]
    Run(run::RunArgs),

    /// Show the robots.txt decision for a URL's origin.
    Robots(robots::RobotsArgs),

    /// Inspect configuration.
    Config(config::ConfigArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error, including invalid configuration.
    Error = 1,
    /// The run finished but no URL succeeded.
    NoSuccess = 2,
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return; // No logging in quiet mode
    }

    let filter = if verbose {
        EnvFilter::new("tierfetch=debug,info")
    } else {
        EnvFilter::new("tierfetch=warn")
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Run(args) => run::run(args, &cli).await,
        Commands::Robots(args) => robots::run(args, &cli).await,
        Commands::Config(args) => config::run(args, &cli),
    };

    match result {
        Ok(ExitCode::Success) => Ok(()),
        Ok(code) => std::process::exit(code as i32),
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {e:#}");
            }
            std::process::exit(ExitCode::Error as i32);
        }
    }
}
