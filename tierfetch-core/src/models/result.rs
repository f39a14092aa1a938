//! Fetch result types.
//!
//! This module contains the records produced by the fetch pipeline:
//! - [`Tier`] - Which fetch strategy produced a result
//! - [`FailureKind`] - Terminal classification of an attempt
//! - [`Route`] - Whether an attempt went through the proxy
//! - [`FetchResult`] - One attempt at one tier
//! - [`HybridResult`] - The final per-URL outcome

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Tier
// ============================================================================

/// A fetch strategy, ordered by cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Cheap stateless HTTP client.
    Http,
    /// Expensive JavaScript-capable browser session.
    Browser,
}

impl Tier {
    /// Returns the display name for this tier.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Browser => "browser",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// Route
// ============================================================================

/// How an attempt reached the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Straight to the origin.
    #[default]
    Direct,
    /// Through the configured upstream proxy.
    Proxy,
}

impl Route {
    /// Returns `Proxy` when a proxy is in use.
    pub fn from_proxy(proxied: bool) -> Self {
        if proxied { Self::Proxy } else { Self::Direct }
    }

    /// Returns the display name for this route.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Proxy => "proxy",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// Failure Kind
// ============================================================================

/// Terminal classification of a fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The attempt succeeded.
    #[default]
    None,
    /// robots.txt forbids the origin; no request was made.
    RobotsBlocked,
    /// The response body looks like a captcha or bot wall.
    Captcha,
    /// The final response carried an error status.
    HttpError,
    /// The request could not be completed (connect, reset, navigation, pool).
    TransportError,
    /// The attempt exceeded its time budget.
    Timeout,
}

impl FailureKind {
    /// Returns a short label, identical to the serialized form.
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::RobotsBlocked => "robots_blocked",
            Self::Captcha => "captcha",
            Self::HttpError => "http_error",
            Self::TransportError => "transport_error",
            Self::Timeout => "timeout",
        }
    }

    /// Returns true if this is a failure.
    pub fn is_failure(&self) -> bool {
        *self != Self::None
    }

    /// Returns a badness rank (0 = success).
    ///
    /// Used when merging tiers: a lower rank is a more useful outcome.
    /// An error status still produced a response, a captcha produced a
    /// page, while timeouts and transport failures produced nothing.
    pub fn rank(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::HttpError => 1,
            Self::Captcha => 2,
            Self::Timeout => 3,
            Self::TransportError => 4,
            Self::RobotsBlocked => 5,
        }
    }

    /// Returns all kinds in rank order.
    pub fn all() -> &'static [FailureKind] {
        &[
            Self::None,
            Self::HttpError,
            Self::Captcha,
            Self::Timeout,
            Self::TransportError,
            Self::RobotsBlocked,
        ]
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Returns true if an HTTP status indicates a non-error response.
pub fn is_success_status(status: u16) -> bool {
    status < 400
}

// ============================================================================
// Fetch Result
// ============================================================================

/// The outcome of one fetch attempt at one tier.
///
/// Built through [`FetchResult::builder`], which derives `success` so that
/// `success` holds exactly when `failure_kind` is [`FailureKind::None`] and
/// the status code is not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    /// The URL that was requested.
    pub url: String,
    /// Origin (`scheme://host[:port]`) of the URL.
    pub origin: String,
    /// Tier that produced this result.
    pub tier: Tier,
    /// Final HTTP status, if a response was received.
    pub status_code: Option<u16>,
    /// Wall time of the final attempt in milliseconds.
    pub latency_ms: u64,
    /// Time to first byte of the final attempt, if measurable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttfb_ms: Option<u64>,
    /// How the attempt was routed.
    #[serde(default)]
    pub route: Route,
    /// Length of the fetched content in bytes (0 on failure).
    pub content_bytes: u64,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Failure classification.
    pub failure_kind: FailureKind,
    /// Number of retries made after the first attempt.
    pub retry_count: u32,
    /// Detail of the last error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the result was recorded.
    pub timestamp: DateTime<Utc>,
}

impl FetchResult {
    /// Starts building a result for the given URL, origin, and tier.
    pub fn builder(
        url: impl Into<String>,
        origin: impl Into<String>,
        tier: Tier,
    ) -> FetchResultBuilder {
        FetchResultBuilder::new(url.into(), origin.into(), tier)
    }

    /// Creates the synthetic result for a URL whose origin robots.txt denies.
    pub fn robots_blocked(url: impl Into<String>, origin: impl Into<String>) -> Self {
        Self::builder(url, origin, Tier::Http)
            .failure(FailureKind::RobotsBlocked)
            .build()
    }
}

// ============================================================================
// Fetch Result Builder
// ============================================================================

/// Builder for [`FetchResult`].
#[derive(Debug, Clone)]
pub struct FetchResultBuilder {
    url: String,
    origin: String,
    tier: Tier,
    status_code: Option<u16>,
    latency_ms: u64,
    ttfb_ms: Option<u64>,
    route: Route,
    content_bytes: u64,
    failure_kind: FailureKind,
    retry_count: u32,
    error: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

impl FetchResultBuilder {
    fn new(url: String, origin: String, tier: Tier) -> Self {
        Self {
            url,
            origin,
            tier,
            status_code: None,
            latency_ms: 0,
            ttfb_ms: None,
            route: Route::Direct,
            content_bytes: 0,
            failure_kind: FailureKind::None,
            retry_count: 0,
            error: None,
            timestamp: None,
        }
    }

    /// Sets the final status code.
    pub fn status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Sets the optional status code.
    pub fn status_code(mut self, status: Option<u16>) -> Self {
        self.status_code = status;
        self
    }

    /// Sets the latency of the final attempt.
    pub fn latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Sets the time to first byte.
    pub fn ttfb_ms(mut self, ttfb_ms: Option<u64>) -> Self {
        self.ttfb_ms = ttfb_ms;
        self
    }

    /// Sets how the attempt was routed.
    pub fn route(mut self, route: Route) -> Self {
        self.route = route;
        self
    }

    /// Sets the content length.
    pub fn content_bytes(mut self, content_bytes: u64) -> Self {
        self.content_bytes = content_bytes;
        self
    }

    /// Sets the failure classification.
    pub fn failure(mut self, kind: FailureKind) -> Self {
        self.failure_kind = kind;
        self
    }

    /// Sets the retry count.
    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Sets the error detail.
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Overrides the timestamp (defaults to now).
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Builds the result, deriving `success`.
    pub fn build(self) -> FetchResult {
        let status_ok = self.status_code.is_some_and(is_success_status);
        let success = self.failure_kind == FailureKind::None && status_ok;
        // A result without a failure kind but with an error status (or no
        // status at all) is an HTTP error, never a silent success.
        let failure_kind = if self.failure_kind == FailureKind::None && !status_ok {
            if self.status_code.is_some() {
                FailureKind::HttpError
            } else {
                FailureKind::TransportError
            }
        } else {
            self.failure_kind
        };

        FetchResult {
            url: self.url,
            origin: self.origin,
            tier: self.tier,
            status_code: self.status_code,
            latency_ms: self.latency_ms,
            ttfb_ms: self.ttfb_ms,
            route: self.route,
            content_bytes: if success { self.content_bytes } else { 0 },
            success,
            failure_kind,
            retry_count: self.retry_count,
            error: self.error,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

// ============================================================================
// Hybrid Result
// ============================================================================

/// The final outcome for one URL, chosen between the HTTP and browser tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridResult {
    /// The URL.
    pub url: String,
    /// Tier whose result was chosen.
    pub chosen_tier: Tier,
    /// The chosen result.
    pub result: FetchResult,
    /// The HTTP attempt, kept for comparison when the URL was escalated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_result: Option<FetchResult>,
    /// The browser attempt, present when the URL was escalated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_result: Option<FetchResult>,
    /// The policy asked for escalation but the run's ceiling was reached.
    #[serde(default)]
    pub escalation_suppressed: bool,
}

impl HybridResult {
    /// Creates a result that stayed on the HTTP tier.
    pub fn http_only(result: FetchResult) -> Self {
        Self {
            url: result.url.clone(),
            chosen_tier: result.tier,
            result,
            http_result: None,
            browser_result: None,
            escalation_suppressed: false,
        }
    }

    /// Creates a result for an HTTP attempt whose escalation was suppressed.
    pub fn suppressed(result: FetchResult) -> Self {
        Self {
            escalation_suppressed: true,
            ..Self::http_only(result)
        }
    }

    /// Merges an HTTP attempt with the browser attempt it escalated to.
    ///
    /// The browser result wins unless it failed worse than the HTTP
    /// result; equal outcomes go to the browser.
    pub fn merge(http: FetchResult, browser: FetchResult) -> Self {
        let browser_wins = browser.failure_kind.rank() <= http.failure_kind.rank();
        let chosen = if browser_wins {
            browser.clone()
        } else {
            http.clone()
        };

        Self {
            url: http.url.clone(),
            chosen_tier: chosen.tier,
            result: chosen,
            http_result: Some(http),
            browser_result: Some(browser),
            escalation_suppressed: false,
        }
    }

    /// Returns true if the URL went to the browser tier.
    pub fn escalated(&self) -> bool {
        self.browser_result.is_some()
    }

    /// Returns true if the chosen result succeeded.
    pub fn is_success(&self) -> bool {
        self.result.success
    }

    /// Returns every attempt made for this URL, HTTP first.
    pub fn attempts(&self) -> Vec<&FetchResult> {
        match (&self.http_result, &self.browser_result) {
            (Some(http), Some(browser)) => vec![http, browser],
            _ => vec![&self.result],
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
