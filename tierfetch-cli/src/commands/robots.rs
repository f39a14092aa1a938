//! Robots command - show the robots.txt decision for an origin.

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;

use tierfetch_core::origin_of;
use tierfetch_fetch::{HttpClient, HttpRobotsSource, RobotsCache};

use super::load_settings;
use crate::output::{JsonFormatter, RobotsOutput, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the robots command.
#[derive(Args)]
pub struct RobotsArgs {
    /// Any URL on the origin to check.
    pub url: String,
}

/// Runs the robots command.
pub async fn run(args: &RobotsArgs, cli: &Cli) -> Result<ExitCode> {
    let origin = origin_of(&args.url)
        .with_context(|| format!("not an http(s) URL: {}", args.url))?;
    let (config, proxy) = load_settings(cli)?;

    let proxy = proxy.filter(|_| config.general.use_proxy);
    let client = HttpClient::from_config(&config.general, &config.http, proxy.as_ref())
        .context("failed to build HTTP client")?;
    let source = Arc::new(HttpRobotsSource::new(client, config.robots.fetch_timeout()));
    let cache = RobotsCache::open(&config.robots, &config.general.user_agent, source).await;

    let cached = cache
        .get(&origin)
        .is_some_and(|entry| !entry.is_stale());
    let decision = cache.decide(&origin).await;
    cache.flush_logged().await;

    let ttl_expiry = cache.get(&origin).map(|entry| entry.ttl_expiry);
    let output = RobotsOutput {
        origin,
        allowed: decision.is_allowed(),
        cached,
        ttl_expiry,
    };
    match cli.format {
        OutputFormat::Text => {
            println!("{}", TextFormatter::new(!cli.no_color).format_robots(&output));
        }
        OutputFormat::Json => println!("{}", JsonFormatter::new(cli.pretty).format(&output)?),
    }

    Ok(ExitCode::Success)
}
