//! HTTP tier.
//!
//! Each attempt holds one slot of a counting admission gate. The slot is
//! released before a backoff sleep so waiting retries do not starve other
//! URLs.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use tierfetch_core::{FailureKind, FetchResult, HttpConfig, Tier, origin_of};

use super::{classify_response, millis};
use crate::captcha::CaptchaDetector;
use crate::error::HttpError;
use crate::host::http::HttpClient;
use crate::retry::RetryStrategy;

// ============================================================================
// Attempt
// ============================================================================

/// Outcome of a single HTTP attempt.
#[derive(Debug)]
struct Attempt {
    status: Option<u16>,
    kind: FailureKind,
    content_bytes: u64,
    latency: Duration,
    ttfb: Option<Duration>,
    error: Option<String>,
    retryable: bool,
}

impl Attempt {
    fn from_error(error: &HttpError, latency: Duration) -> Self {
        let kind = if error.is_timeout() {
            FailureKind::Timeout
        } else {
            FailureKind::TransportError
        };
        Self {
            status: None,
            kind,
            content_bytes: 0,
            latency,
            ttfb: None,
            error: Some(error.to_string()),
            retryable: error.is_retryable(),
        }
    }
}

// ============================================================================
// HTTP Fetcher
// ============================================================================

/// Fetches URLs over HTTP with retries and failure classification.
pub struct HttpFetcher {
    client: HttpClient,
    gate: Arc<Semaphore>,
    config: HttpConfig,
    retry: RetryStrategy,
    detector: Arc<dyn CaptchaDetector>,
}

impl HttpFetcher {
    /// Creates a fetcher with its own admission gate.
    pub fn new(client: HttpClient, config: &HttpConfig, detector: Arc<dyn CaptchaDetector>) -> Self {
        Self {
            client,
            gate: Arc::new(Semaphore::new(config.concurrency)),
            config: config.clone(),
            retry: RetryStrategy::from_config(config),
            detector,
        }
    }

    /// Overrides the retry strategy.
    pub fn with_retry(mut self, retry: RetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    /// Closes the admission gate; later attempts fail without a request.
    pub fn close(&self) {
        self.gate.close();
    }

    /// Returns the number of requests currently holding a gate slot.
    pub fn in_flight(&self) -> usize {
        self.config.concurrency - self.gate.available_permits()
    }

    /// Fetches one URL, retrying transient failures.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &str) -> FetchResult {
        let origin = origin_of(url).unwrap_or_default();
        let mut retries: u32 = 0;

        let last = loop {
            let attempt = self.attempt(url).await;
            debug!(
                attempt = retries + 1,
                status = ?attempt.status,
                kind = %attempt.kind,
                latency_ms = millis(attempt.latency),
                "HTTP attempt finished"
            );

            if !attempt.retryable || retries >= self.retry.max_retries {
                break attempt;
            }

            retries += 1;
            let delay = self.retry.jittered_delay(retries);
            warn!(
                retry = retries,
                delay_ms = millis(delay),
                kind = %attempt.kind,
                "Retrying HTTP fetch"
            );
            tokio::time::sleep(delay).await;
        };

        // A transient failure that outlived every retry is a transport
        // failure, whatever the last attempt looked like.
        let kind = if last.retryable && retries > 0 {
            FailureKind::TransportError
        } else {
            last.kind
        };

        let mut builder = FetchResult::builder(url, origin, Tier::Http)
            .route(self.client.route())
            .status_code(last.status)
            .latency_ms(millis(last.latency))
            .ttfb_ms(last.ttfb.map(millis))
            .content_bytes(last.content_bytes)
            .failure(kind)
            .retry_count(retries);
        if let Some(error) = last.error {
            builder = builder.error(error);
        }
        builder.build()
    }

    async fn attempt(&self, url: &str) -> Attempt {
        let Ok(_permit) = self.gate.acquire().await else {
            return Attempt::from_error(
                &HttpError::Build("admission gate closed".to_string()),
                Duration::ZERO,
            );
        };

        let start = Instant::now();
        let budget = self.client.total_timeout();
        match tokio::time::timeout(budget, self.request(url, start)).await {
            Ok(attempt) => attempt,
            Err(_) => Attempt::from_error(&HttpError::Timeout(budget), start.elapsed()),
        }
    }

    async fn request(&self, url: &str, start: Instant) -> Attempt {
        let response = match self.client.get(url).await {
            Ok(response) => response,
            Err(e) => return Attempt::from_error(&e, start.elapsed()),
        };
        let ttfb = start.elapsed();
        let status = response.status().as_u16();

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                let mut attempt = Attempt::from_error(&HttpError::Request(e), start.elapsed());
                attempt.status = Some(status);
                attempt.ttfb = Some(ttfb);
                return attempt;
            }
        };
        let latency = start.elapsed();

        let is_captcha = self.detector.is_captcha(&body);
        let kind = classify_response(status, is_captcha);
        let retryable = !is_captcha && self.config.is_retryable_status(status);

        Attempt {
            status: Some(status),
            kind,
            content_bytes: body.len() as u64,
            latency,
            ttfb: Some(ttfb),
            error: (kind == FailureKind::HttpError).then(|| HttpError::Status(status).to_string()),
            retryable,
        }
    }
}
