//! Host APIs for the fetch tiers.
//!
//! - [`http`] - HTTP client with tracing, timeouts, and proxy routing
//! - [`browser`] - Browser engine traits and the Chromium engine

pub mod browser;
pub mod http;

// Re-export key types
pub use browser::{
    BrowserEngine, BrowserSession, ChromiumEngine, ChromiumOptions, PageLoad, find_chromium,
};
pub use http::HttpClient;
