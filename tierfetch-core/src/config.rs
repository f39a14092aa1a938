//! Structured pipeline configuration.
//!
//! Every field has a documented default. Sections and keys missing from a
//! config file take their defaults and unknown keys are ignored.
//! [`Config::validate`] is called once at startup; an invalid configuration
//! never reaches the pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CoreError;

// ============================================================================
// Top-level Config
// ============================================================================

/// Full tierfetch configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Settings shared by both tiers.
    pub general: GeneralConfig,
    /// HTTP tier.
    pub http: HttpConfig,
    /// Browser tier.
    pub browser: BrowserConfig,
    /// Robots cache.
    pub robots: RobotsConfig,
    /// Escalation policy thresholds.
    pub escalation: EscalationConfig,
}

impl Config {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks every field, failing on the first invalid one.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.general.validate()?;
        self.http.validate()?;
        self.browser.validate()?;
        self.robots.validate()?;
        Ok(())
    }

    /// Returns the URLs-in-flight bound for a run.
    pub fn max_in_flight(&self) -> usize {
        self.http.concurrency + self.browser.pool_size
    }
}

fn invalid(field: &str, reason: &str) -> CoreError {
    CoreError::Config(format!("{field}: {reason}"))
}

fn non_zero(field: &str, value: u64) -> Result<(), CoreError> {
    if value == 0 {
        return Err(invalid(field, "must be greater than zero"));
    }
    Ok(())
}

// ============================================================================
// General
// ============================================================================

/// Settings shared by both tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// User agent sent by both tiers and matched against robots groups.
    pub user_agent: String,
    /// Route traffic through the proxy when one is supplied.
    pub use_proxy: bool,
    /// How much of a body the captcha heuristic inspects.
    pub captcha_detection_bytes: usize,
    /// Case-insensitive captcha markers.
    pub captcha_markers: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            use_proxy: true,
            captcha_detection_bytes: 4096,
            captcha_markers: default_captcha_markers(),
        }
    }
}

impl GeneralConfig {
    fn validate(&self) -> Result<(), CoreError> {
        if self.user_agent.trim().is_empty() {
            return Err(invalid("general.user_agent", "must not be empty"));
        }
        non_zero(
            "general.captcha_detection_bytes",
            self.captcha_detection_bytes as u64,
        )
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}

fn default_captcha_markers() -> Vec<String> {
    vec!["captcha".to_string(), "are you a robot".to_string()]
}

// ============================================================================
// HTTP
// ============================================================================

/// HTTP tier settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Maximum concurrently in-flight HTTP requests.
    pub concurrency: usize,
    /// Budget for one whole attempt, including the body.
    pub total_timeout_ms: u64,
    /// Budget for establishing the connection.
    pub connect_timeout_ms: u64,
    /// Budget between reads of the response.
    pub read_timeout_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// First backoff delay.
    pub backoff_base_ms: u64,
    /// Backoff ceiling.
    pub backoff_max_ms: u64,
    /// Upper bound of the random delay added to each backoff.
    pub backoff_jitter_ms: u64,
    /// 4xx statuses that are retried like 5xx.
    pub retryable_statuses: Vec<u16>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            concurrency: 20,
            total_timeout_ms: 20_000,
            connect_timeout_ms: 10_000,
            read_timeout_ms: 15_000,
            max_retries: 1,
            backoff_base_ms: 100,
            backoff_max_ms: 5_000,
            backoff_jitter_ms: 200,
            retryable_statuses: vec![408, 429],
        }
    }
}

impl HttpConfig {
    fn validate(&self) -> Result<(), CoreError> {
        non_zero("http.concurrency", self.concurrency as u64)?;
        non_zero("http.total_timeout_ms", self.total_timeout_ms)?;
        non_zero("http.connect_timeout_ms", self.connect_timeout_ms)?;
        non_zero("http.read_timeout_ms", self.read_timeout_ms)?;
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(invalid(
                "http.backoff_base_ms",
                "must not exceed http.backoff_max_ms",
            ));
        }
        if let Some(status) = self
            .retryable_statuses
            .iter()
            .find(|s| !(400..=499).contains(*s))
        {
            return Err(invalid(
                "http.retryable_statuses",
                &format!("{status} is not a 4xx status"),
            ));
        }
        Ok(())
    }

    /// Returns the total timeout.
    pub fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }

    /// Returns the connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns the read timeout.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Returns true if a response status is worth retrying: any 5xx, or
    /// a status listed in `retryable_statuses`.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        status >= 500 || self.retryable_statuses.contains(&status)
    }
}

// ============================================================================
// Browser
// ============================================================================

/// Browser tier settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run the browser without a window.
    pub headless: bool,
    /// Budget for one navigation, including content extraction.
    pub navigation_timeout_ms: u64,
    /// Abort image, font, and media requests.
    pub block_heavy_resources: bool,
    /// Number of reusable browser sessions.
    pub pool_size: usize,
    /// Ceiling on browser invocations per run.
    pub max_escalations: usize,
    /// How long a caller waits for a free session.
    pub acquire_timeout_ms: u64,
    /// Browser UI and `Accept-Language` locale.
    pub locale: String,
    /// Explicit Chromium binary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chromium_path: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout_ms: 20_000,
            block_heavy_resources: true,
            pool_size: 2,
            max_escalations: 100,
            acquire_timeout_ms: 30_000,
            locale: "en-US".to_string(),
            chromium_path: None,
        }
    }
}

impl BrowserConfig {
    fn validate(&self) -> Result<(), CoreError> {
        non_zero("browser.pool_size", self.pool_size as u64)?;
        non_zero("browser.navigation_timeout_ms", self.navigation_timeout_ms)?;
        non_zero("browser.acquire_timeout_ms", self.acquire_timeout_ms)?;
        Ok(())
    }

    /// Returns the navigation timeout.
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    /// Returns the pool acquire timeout.
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

// ============================================================================
// Robots
// ============================================================================

/// Decision used when robots.txt cannot be fetched or parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RobotsDefault {
    /// Treat the origin as allowed.
    #[default]
    Allow,
    /// Treat the origin as disallowed.
    Deny,
}

impl RobotsDefault {
    /// Returns true for [`RobotsDefault::Allow`].
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Robots cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotsConfig {
    /// Persisted cache file.
    pub cache_file_path: PathBuf,
    /// How long a decision is trusted.
    ///
    /// Zero disables reuse across lookups; concurrent lookups for one
    /// origin still share a single fetch.
    pub ttl_seconds: u64,
    /// Decision when robots.txt cannot be obtained.
    pub default_on_fetch_failure: RobotsDefault,
    /// Budget for one robots.txt request.
    pub fetch_timeout_ms: u64,
    /// Save the file after this many new entries.
    pub flush_every: usize,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            cache_file_path: PathBuf::from("data/robots_cache.json"),
            ttl_seconds: 86_400,
            default_on_fetch_failure: RobotsDefault::Allow,
            fetch_timeout_ms: 10_000,
            flush_every: 16,
        }
    }
}

impl RobotsConfig {
    fn validate(&self) -> Result<(), CoreError> {
        non_zero("robots.fetch_timeout_ms", self.fetch_timeout_ms)?;
        non_zero("robots.flush_every", self.flush_every as u64)?;
        Ok(())
    }

    /// Returns the TTL as a chrono duration.
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX))
    }

    /// Returns the robots fetch timeout.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

// ============================================================================
// Escalation
// ============================================================================

/// Escalation policy thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// A success with fewer bytes than this escalates.
    pub min_bytes_for_escalation: u64,
    /// Escalate slow successes.
    pub latency_trigger: bool,
    /// Latency above which a success counts as slow.
    pub latency_threshold_ms: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            min_bytes_for_escalation: 2048,
            latency_trigger: false,
            latency_threshold_ms: 5_000,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.http.concurrency, 20);
        assert_eq!(config.browser.pool_size, 2);
        assert_eq!(config.robots.ttl_seconds, 86_400);
        assert_eq!(config.escalation.min_bytes_for_escalation, 2048);
        assert_eq!(config.max_in_flight(), 22);
    }

    fn assert_rejected(field: &str, mutate: impl Fn(&mut Config)) {
        let mut config = Config::default();
        mutate(&mut config);
        let err = config.validate().unwrap_err();
        assert!(
            err.to_string().contains(field),
            "expected error for {field}, got {err}"
        );
    }

    #[test]
    fn test_validate_rejects_each_invalid_field() {
        assert_rejected("http.concurrency", |c| c.http.concurrency = 0);
        assert_rejected("http.total_timeout_ms", |c| c.http.total_timeout_ms = 0);
        assert_rejected("http.connect_timeout_ms", |c| c.http.connect_timeout_ms = 0);
        assert_rejected("http.read_timeout_ms", |c| c.http.read_timeout_ms = 0);
        assert_rejected("http.backoff_base_ms", |c| {
            c.http.backoff_base_ms = 10_000;
            c.http.backoff_max_ms = 100;
        });
        assert_rejected("http.retryable_statuses", |c| {
            c.http.retryable_statuses = vec![429, 503];
        });
        assert_rejected("browser.pool_size", |c| c.browser.pool_size = 0);
        assert_rejected("browser.navigation_timeout_ms", |c| {
            c.browser.navigation_timeout_ms = 0;
        });
        assert_rejected("browser.acquire_timeout_ms", |c| {
            c.browser.acquire_timeout_ms = 0;
        });
        assert_rejected("robots.fetch_timeout_ms", |c| c.robots.fetch_timeout_ms = 0);
        assert_rejected("robots.flush_every", |c| c.robots.flush_every = 0);
        assert_rejected("general.user_agent", |c| c.general.user_agent = "  ".into());
        assert_rejected("general.captcha_detection_bytes", |c| {
            c.general.captcha_detection_bytes = 0;
        });
    }

    #[test]
    fn test_zero_max_escalations_is_valid() {
        let mut config = Config::default();
        config.browser.max_escalations = 0;
        config.http.max_retries = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retryable_statuses() {
        let http = HttpConfig::default();
        assert!(http.is_retryable_status(503));
        assert!(http.is_retryable_status(429));
        assert!(http.is_retryable_status(408));
        assert!(!http.is_retryable_status(404));
        assert!(!http.is_retryable_status(200));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"http": {"concurrency": 5}, "unknown": 1}"#).unwrap();
        assert_eq!(config.http.concurrency, 5);
        assert_eq!(config.http.max_retries, 1);
        assert_eq!(config.browser, BrowserConfig::default());
    }

    #[test]
    fn test_robots_default_serde() {
        let parsed: RobotsDefault = serde_json::from_str(r#""deny""#).unwrap();
        assert_eq!(parsed, RobotsDefault::Deny);
        assert!(!parsed.is_allow());
    }
}
