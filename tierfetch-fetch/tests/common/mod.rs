//! Shared in-process fakes for the browser tier.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tierfetch_fetch::{BrowserEngine, BrowserError, BrowserSession, PageLoad};

/// Counters shared by a fake engine and its sessions.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub created: AtomicUsize,
    pub closed: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub navigating: AtomicUsize,
    pub max_navigating: AtomicUsize,
    pub visited: Mutex<Vec<String>>,
}

impl EngineStats {
    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }
}

/// A browser engine whose pages behave according to their URL:
///
/// - `crash` in the URL: the session dies
/// - `hang` in the URL: navigation never finishes
/// - `captcha` in the URL: a captcha page
/// - `status404` in the URL: a 404 document
/// - `nostatus` in the URL: no document status reported
/// - anything else: a 200 page of `page_bytes` bytes
pub struct FakeEngine {
    pub stats: Arc<EngineStats>,
    pub delay: Duration,
    pub page_bytes: usize,
    pub fail_create: bool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(EngineStats::default()),
            delay: Duration::from_millis(10),
            page_bytes: 4000,
            fail_create: false,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl BrowserEngine for FakeEngine {
    async fn new_session(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        if self.fail_create {
            return Err(BrowserError::Session("engine unavailable".to_string()));
        }
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            stats: Arc::clone(&self.stats),
            delay: self.delay,
            page_bytes: self.page_bytes,
            dead: false,
        }))
    }

    async fn shutdown(&self) {
        self.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeSession {
    stats: Arc<EngineStats>,
    delay: Duration,
    page_bytes: usize,
    dead: bool,
}

struct NavigatingGuard(Arc<EngineStats>);

impl NavigatingGuard {
    fn enter(stats: &Arc<EngineStats>) -> Self {
        let now = stats.navigating.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_navigating.fetch_max(now, Ordering::SeqCst);
        Self(Arc::clone(stats))
    }
}

impl Drop for NavigatingGuard {
    fn drop(&mut self) {
        self.0.navigating.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> Result<PageLoad, BrowserError> {
        assert!(!self.dead, "a crashed session was reused");
        self.stats.visited.lock().unwrap().push(url.to_string());
        let _guard = NavigatingGuard::enter(&self.stats);

        if url.contains("hang") {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        tokio::time::sleep(self.delay).await;

        if url.contains("crash") {
            self.dead = true;
            return Err(BrowserError::Crashed("target closed".to_string()));
        }
        if url.contains("captcha") {
            return Ok(PageLoad {
                status: Some(200),
                ttfb: Some(self.delay),
                content: "<html>Please solve this CAPTCHA</html>".to_string(),
            });
        }
        if url.contains("status404") {
            return Ok(PageLoad {
                status: Some(404),
                ttfb: Some(self.delay),
                content: "<html>not found</html>".to_string(),
            });
        }
        let status = if url.contains("nostatus") { None } else { Some(200) };
        Ok(PageLoad {
            status,
            ttfb: Some(self.delay),
            content: "x".repeat(self.page_bytes),
        })
    }

    async fn close(self: Box<Self>) {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
    }
}
