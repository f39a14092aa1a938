//! Store error types.

use thiserror::Error;

use tierfetch_core::CoreError;

/// Errors that can occur in the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML config error.
    #[error("Config file error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid configuration or proxy descriptor.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StoreError {
    /// Returns true if the error means the file does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}
