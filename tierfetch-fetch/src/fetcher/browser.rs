//! Browser tier.
//!
//! Sessions come from a bounded [`SessionPool`]. A checked-out session is
//! held by a [`PooledSession`] guard that returns it on drop. A session
//! that crashed or timed out is discarded instead, and the next acquire
//! creates a replacement, so waiters are never blocked on a dead session.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument, warn};

use tierfetch_core::{BrowserConfig, FailureKind, FetchResult, Route, Tier, origin_of};

use super::{classify_response, millis};
use crate::captcha::CaptchaDetector;
use crate::error::{BrowserError, PoolError};
use crate::host::browser::{BrowserEngine, BrowserSession, PageLoad};

type IdleSessions = Arc<Mutex<Vec<Box<dyn BrowserSession>>>>;

// ============================================================================
// Session Pool
// ============================================================================

/// A bounded pool of reusable browser sessions.
pub struct SessionPool {
    engine: Arc<dyn BrowserEngine>,
    permits: Arc<Semaphore>,
    idle: IdleSessions,
    size: usize,
    acquire_timeout: Duration,
    created: AtomicUsize,
    discarded: Arc<AtomicUsize>,
}

impl SessionPool {
    /// Creates a pool of at most `size` live sessions.
    pub fn new(engine: Arc<dyn BrowserEngine>, size: usize, acquire_timeout: Duration) -> Self {
        Self {
            engine,
            permits: Arc::new(Semaphore::new(size)),
            idle: Arc::new(Mutex::new(Vec::with_capacity(size))),
            size,
            acquire_timeout,
            created: AtomicUsize::new(0),
            discarded: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Waits for a free slot and returns a session for it.
    ///
    /// An idle session is reused when available; otherwise a new one is
    /// created. The slot is released if creation fails.
    pub async fn acquire(&self) -> Result<PooledSession, PoolError> {
        let permit = tokio::time::timeout(
            self.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        .map_err(|_| PoolError::AcquireTimeout(self.acquire_timeout))?
        .map_err(|_| PoolError::Closed)?;

        let reused = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let session = match reused {
            Some(session) => session,
            None => {
                let session = self.engine.new_session().await?;
                let total = self.created.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(created = total, "Created browser session");
                session
            }
        };

        Ok(PooledSession {
            session: Some(session),
            idle: Arc::clone(&self.idle),
            discarded: Arc::clone(&self.discarded),
            _permit: permit,
        })
    }

    /// Returns the configured pool size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the number of sessions currently checked out.
    pub fn checked_out(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    /// Returns how many sessions have been created.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Returns how many sessions have been discarded.
    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Refuses new acquisitions, closes idle sessions, and stops the engine.
    ///
    /// Sessions still checked out are closed by their holders; call this
    /// once every fetch has finished.
    pub async fn shutdown(&self) {
        self.permits.close();
        let idle: Vec<_> = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let closed = idle.len();
        for session in idle {
            session.close().await;
        }
        self.engine.shutdown().await;
        debug!(closed, "Session pool shut down");
    }
}

// ============================================================================
// Pooled Session
// ============================================================================

/// A checked-out session. Returned to the pool on drop.
pub struct PooledSession {
    session: Option<Box<dyn BrowserSession>>,
    idle: IdleSessions,
    discarded: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl PooledSession {
    /// Navigates the session.
    pub async fn navigate(&mut self, url: &str) -> Result<PageLoad, BrowserError> {
        match self.session.as_mut() {
            Some(session) => session.navigate(url).await,
            None => Err(BrowserError::Crashed("session already discarded".to_string())),
        }
    }

    /// Closes the session instead of returning it to the pool.
    ///
    /// The slot is freed once the session is closed.
    pub async fn discard(mut self) {
        if let Some(session) = self.session.take() {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            session.close().await;
        }
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        // Runs before the permit field drops, so a woken waiter finds the
        // session already idle.
        if let Some(session) = self.session.take() {
            self.idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(session);
        }
    }
}

// ============================================================================
// Escalation Budget
// ============================================================================

/// Ceiling on browser escalations for one run.
#[derive(Debug)]
pub struct EscalationBudget {
    max: usize,
    used: AtomicUsize,
}

impl EscalationBudget {
    /// Creates a budget of `max` escalations.
    pub fn new(max: usize) -> Self {
        Self {
            max,
            used: AtomicUsize::new(0),
        }
    }

    /// Reserves one escalation. Returns false once the ceiling is reached.
    pub fn try_reserve(&self) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.max).then_some(used + 1)
            })
            .is_ok()
    }

    /// Returns the number of escalations reserved so far.
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Returns the number of escalations left.
    pub fn remaining(&self) -> usize {
        self.max.saturating_sub(self.used())
    }
}

// ============================================================================
// Browser Fetcher
// ============================================================================

/// Fetches URLs through pooled browser sessions.
pub struct BrowserFetcher {
    pool: SessionPool,
    navigation_timeout: Duration,
    detector: Arc<dyn CaptchaDetector>,
    route: Route,
}

impl BrowserFetcher {
    /// Creates a fetcher over the given engine.
    pub fn new(
        engine: Arc<dyn BrowserEngine>,
        config: &BrowserConfig,
        detector: Arc<dyn CaptchaDetector>,
    ) -> Self {
        Self {
            pool: SessionPool::new(engine, config.pool_size, config.acquire_timeout()),
            navigation_timeout: config.navigation_timeout(),
            detector,
            route: Route::Direct,
        }
    }

    /// Records how the engine's traffic is routed.
    pub fn with_route(mut self, route: Route) -> Self {
        self.route = route;
        self
    }

    /// Returns the session pool.
    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Fetches one URL in a browser session.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &str) -> FetchResult {
        let origin = origin_of(url).unwrap_or_default();
        let result = |kind: FailureKind| {
            FetchResult::builder(url, origin.clone(), Tier::Browser)
                .route(self.route)
                .failure(kind)
        };

        let mut session = match self.pool.acquire().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "No browser session available");
                return result(FailureKind::TransportError).error(e.to_string()).build();
            }
        };

        let start = Instant::now();
        let outcome = tokio::time::timeout(self.navigation_timeout, session.navigate(url)).await;
        let latency = millis(start.elapsed());

        match outcome {
            Ok(Ok(page)) => {
                drop(session);
                let status = page.status.unwrap_or(200);
                let is_captcha = self.detector.is_captcha(page.content.as_bytes());
                let kind = classify_response(status, is_captcha);
                debug!(status, kind = %kind, latency_ms = latency, "Browser navigation finished");
                result(kind)
                    .status(status)
                    .latency_ms(latency)
                    .ttfb_ms(page.ttfb.map(millis))
                    .content_bytes(page.content.len() as u64)
                    .build()
            }
            Ok(Err(e)) => {
                if e.is_session_fatal() {
                    warn!(error = %e, "Discarding crashed browser session");
                    session.discard().await;
                } else {
                    drop(session);
                }
                let kind = if matches!(e, BrowserError::Timeout(_)) {
                    FailureKind::Timeout
                } else {
                    FailureKind::TransportError
                };
                result(kind).latency_ms(latency).error(e.to_string()).build()
            }
            Err(_) => {
                let error = BrowserError::Timeout(self.navigation_timeout);
                warn!(error = %error, "Discarding timed-out browser session");
                session.discard().await;
                result(FailureKind::Timeout)
                    .latency_ms(latency)
                    .error(error.to_string())
                    .build()
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
