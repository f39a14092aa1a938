// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # tierfetch Core
//!
//! Core types, models, and configuration shared by the tierfetch crates.
//!
//! ## Key Types
//!
//! ### Results
//! - [`Tier`] - HTTP or browser
//! - [`FailureKind`] - Terminal classification of an attempt
//! - [`FetchResult`] - One attempt at one tier
//! - [`HybridResult`] - The chosen outcome for one URL
//! - [`Route`] - Proxy or direct
//!
//! ### Robots
//! - [`RobotsDecision`] - Origin-level allow/deny
//! - [`RobotsCacheEntry`] - A decision with its TTL
//!
//! ### Configuration
//! - [`Config`] - Every pipeline knob with its default
//! - [`ProxySettings`] - Parsed proxy descriptor

pub mod config;
pub mod error;
pub mod models;
pub mod proxy;

// Re-export error types
pub use error::CoreError;

// Re-export all model types
pub use models::{
    FailureKind, FetchResult, FetchResultBuilder, HybridResult, RobotsCacheEntry, RobotsDecision,
    Route, Tier, is_success_status, origin_of, parse_url,
};

// Re-export configuration
pub use config::{
    BrowserConfig, Config, EscalationConfig, GeneralConfig, HttpConfig, RobotsConfig,
    RobotsDefault,
};
pub use proxy::ProxySettings;
