// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # tierfetch Fetch
//!
//! Two-tier page fetching: a cheap HTTP client first, a headless browser
//! when the HTTP result is not good enough.
//!
//! ## Components
//!
//! - [`robots::RobotsCache`] - Origin-level robots decisions with TTL,
//!   persistence, and single-flight refresh
//! - [`fetcher::HttpFetcher`] - Retrying HTTP tier under an admission gate
//! - [`fetcher::BrowserFetcher`] - Browser tier over a bounded session pool
//! - [`policy::should_escalate`] - Pure escalation decision
//! - [`pipeline::Pipeline`] - Streams one [`HybridResult`] per URL
//!
//! ## Host APIs
//!
//! - [`host::http`] - HTTP client with timeouts and proxy routing
//! - [`host::browser`] - Browser engine traits and the Chromium engine
//!
//! ## Example
//!
//! ```ignore
//! use futures::StreamExt;
//! use tierfetch_fetch::Pipeline;
//!
//! let pipeline = Pipeline::builder(config).proxy(proxy).build().await?;
//! let mut results = pipeline.run(urls);
//! while let Some(result) = results.next().await {
//!     println!("{} -> {}", result.url, result.chosen_tier);
//! }
//! ```
//!
//! [`HybridResult`]: tierfetch_core::HybridResult

// Core modules
pub mod captcha;
pub mod error;
pub mod fetcher;
pub mod host;
pub mod pipeline;
pub mod policy;
pub mod retry;
pub mod robots;

// Re-export key types at crate root

// Errors
pub use error::{BrowserError, FetchError, HttpError, PoolError, RobotsFetchError};

// Host APIs
pub use host::{
    browser::{BrowserEngine, BrowserSession, ChromiumEngine, ChromiumOptions, PageLoad},
    http::HttpClient,
};

// Tiers, policy & pipeline
pub use captcha::{CaptchaDetector, MarkerCaptchaDetector};
pub use fetcher::{
    BrowserFetcher, EscalationBudget, Fetcher, HttpFetcher, PooledSession, SessionPool,
    classify_response,
};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use policy::should_escalate;
pub use retry::RetryStrategy;
pub use robots::{HttpRobotsSource, RobotsBody, RobotsCache, RobotsSource, parse_robots};
