//! JSON output formatting.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

// ============================================================================
// Output Types
// ============================================================================

/// Robots decision for one origin.
#[derive(Debug, Serialize)]
pub struct RobotsOutput {
    pub origin: String,
    pub allowed: bool,
    /// True if the decision came from a fresh cache entry.
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_expiry: Option<DateTime<Utc>>,
}

// ============================================================================
// JSON Formatter
// ============================================================================

/// JSON output formatter.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Formats any serializable value.
    pub fn format<T: Serialize>(&self, data: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(json)
    }
}
