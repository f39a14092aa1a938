//! Core error types for tierfetch.

use thiserror::Error;

/// Core error type for tierfetch operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Malformed proxy descriptor.
    #[error("Invalid proxy: {0}")]
    ProxyParse(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
