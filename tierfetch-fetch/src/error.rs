//! Fetch error types.
//!
//! Per-URL failures never escape as errors: they are classified into a
//! `FailureKind` on the result. These types carry the detail up to that
//! point, and [`FetchError`] covers setup failures that stop a run before
//! it starts.

use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Main Fetch Error
// ============================================================================

/// Error type for pipeline setup.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Invalid configuration.
    #[error("Core error: {0}")]
    Core(#[from] tierfetch_core::CoreError),

    /// Store error (config or robots file).
    #[error("Store error: {0}")]
    Store(#[from] tierfetch_store::StoreError),

    /// HTTP client could not be built.
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    /// Browser engine could not be configured.
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Captcha markers could not be compiled.
    #[error("Invalid captcha markers: {0}")]
    CaptchaMarkers(#[from] regex::Error),
}

// ============================================================================
// HTTP Error
// ============================================================================

/// HTTP-specific error type.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Transport error from the client.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The attempt exceeded its budget.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The response carried an error status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// The client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}

impl HttpError {
    /// Returns true if the failure is transient and worth retrying.
    ///
    /// Status errors are classified by the fetcher, which knows the
    /// configured retryable statuses.
    pub fn is_retryable(&self) -> bool {
        match self {
            HttpError::Request(e) => {
                e.is_timeout() || e.is_connect() || e.is_body() || (e.is_request() && !e.is_builder())
            }
            HttpError::Timeout(_) => true,
            HttpError::Status(status) => *status >= 500,
            HttpError::InvalidUrl(_) | HttpError::Build(_) => false,
        }
    }

    /// Returns true if the failure is a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            HttpError::Request(e) => e.is_timeout(),
            HttpError::Timeout(_) => true,
            _ => false,
        }
    }
}

// ============================================================================
// Browser Error
// ============================================================================

/// Error type for browser engine operations.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// No Chromium binary could be found.
    #[error("Chromium not found; set browser.chromium_path or TIERFETCH_CHROMIUM_PATH")]
    BinaryNotFound,

    /// The browser process could not be launched.
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    /// A new session (page) could not be created.
    #[error("Failed to create session: {0}")]
    Session(String),

    /// Navigation failed, the session is still usable.
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// The session or browser connection died.
    #[error("Browser session crashed: {0}")]
    Crashed(String),

    /// Navigation exceeded its budget.
    #[error("Navigation timed out after {0:?}")]
    Timeout(Duration),
}

impl BrowserError {
    /// Returns true if the session must be discarded instead of reused.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, BrowserError::Crashed(_) | BrowserError::Timeout(_))
    }
}

// ============================================================================
// Pool Error
// ============================================================================

/// Error type for browser session pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// No session became free in time.
    #[error("Timed out after {0:?} waiting for a browser session")]
    AcquireTimeout(Duration),

    /// The pool was shut down.
    #[error("Browser session pool is closed")]
    Closed,

    /// A replacement session could not be created.
    #[error(transparent)]
    Create(#[from] BrowserError),
}

// ============================================================================
// Robots Fetch Error
// ============================================================================

/// Error type for robots.txt retrieval. Always recovered by the cache.
#[derive(Debug, Error)]
pub enum RobotsFetchError {
    /// Network failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Unexpected status code.
    #[error("Unexpected status {0}")]
    Status(u16),

    /// The body is not a robots file.
    #[error("Malformed robots file: {0}")]
    Malformed(String),
}
