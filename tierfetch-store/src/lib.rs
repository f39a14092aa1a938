// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # tierfetch Store
//!
//! File-backed state for tierfetch.
//!
//! This crate provides:
//!
//! - **Config loading**: YAML configuration with defaults and validation
//! - **Proxy file**: The proxy descriptor read at startup
//! - **RobotsFile**: The persisted robots decision cache
//! - **Persistence**: Atomic JSON file helpers
//!
//! ## Usage
//!
//! ```ignore
//! use tierfetch_store::{load_config_from, load_proxy_file, RobotsFile};
//!
//! let config = load_config_from(Path::new("config.yaml"))?;
//! let proxy = load_proxy_file(Path::new("proxy.txt"))?;
//! let robots = RobotsFile::new(&config.robots.cache_file_path);
//! let entries = robots.load().await;
//! ```

pub mod config_loader;
pub mod error;
pub mod persistence;
pub mod proxy_file;
pub mod robots_file;

pub use config_loader::{
    load_config, load_config_from, load_config_or_default_path, parse_config, render_config,
    resolve_config_path,
};
pub use error::StoreError;
pub use persistence::{
    default_config_dir, default_config_path, default_proxy_path, ensure_dir, load_json,
    load_json_or_default, save_json,
};
pub use proxy_file::load_proxy_file;
pub use robots_file::RobotsFile;
