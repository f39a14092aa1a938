//! CLI command implementations.

pub mod config;
pub mod robots;
pub mod run;

use anyhow::{Context, Result};
use tracing::debug;

use tierfetch_core::{Config, ProxySettings};
use tierfetch_store::{default_proxy_path, load_config_or_default_path, load_proxy_file};

use crate::Cli;

/// Loads the effective configuration and proxy for a command.
///
/// Both failures are fatal: a run never starts on a bad config or proxy.
pub(crate) fn load_settings(cli: &Cli) -> Result<(Config, Option<ProxySettings>)> {
    let config = load_config_or_default_path(cli.config.as_deref())
        .context("failed to load configuration")?;

    let proxy_path = cli.proxy_file.clone().unwrap_or_else(default_proxy_path);
    let proxy = load_proxy_file(&proxy_path)
        .with_context(|| format!("failed to read proxy file {}", proxy_path.display()))?;
    debug!(
        path = %proxy_path.display(),
        configured = proxy.is_some(),
        "Loaded proxy settings"
    );

    Ok((config, proxy))
}
