//! Robots cache behaviour: freshness, single-flight, fallbacks, persistence.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tierfetch_core::{GeneralConfig, HttpConfig, RobotsConfig, RobotsDecision, RobotsDefault};
use tierfetch_fetch::{
    HttpClient, HttpRobotsSource, RobotsBody, RobotsCache, RobotsFetchError, RobotsSource,
};

const UA: &str = "tierfetch-test";
const ORIGIN: &str = "https://a.test";

// ============================================================================
// Scripted Source
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Reply {
    Body(&'static str),
    NotFound,
    Fail,
}

struct ScriptedSource {
    reply: Mutex<Reply>,
    fetches: AtomicUsize,
    delay: Duration,
}

impl ScriptedSource {
    fn new(reply: Reply) -> Arc<Self> {
        Self::slow(reply, Duration::ZERO)
    }

    fn slow(reply: Reply, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(reply),
            fetches: AtomicUsize::new(0),
            delay,
        })
    }

    fn set(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RobotsSource for ScriptedSource {
    async fn fetch_robots(&self, _origin: &str) -> Result<RobotsBody, RobotsFetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reply = *self.reply.lock().unwrap();
        match reply {
            Reply::Body(body) => Ok(RobotsBody::Found(body.to_string())),
            Reply::NotFound => Ok(RobotsBody::NotFound),
            Reply::Fail => Err(RobotsFetchError::Network("connection reset".to_string())),
        }
    }
}

fn config() -> RobotsConfig {
    RobotsConfig {
        ttl_seconds: 3600,
        ..RobotsConfig::default()
    }
}

fn persisted_config(dir: &TempDir) -> RobotsConfig {
    RobotsConfig {
        cache_file_path: dir.path().join("robots_cache.json"),
        ..config()
    }
}

// ============================================================================
// Freshness
// ============================================================================

#[tokio::test]
async fn test_fresh_entry_is_served_from_cache() {
    let source = ScriptedSource::new(Reply::NotFound);
    let cache = RobotsCache::in_memory(&config(), UA, source.clone());

    assert_eq!(cache.decide(ORIGIN).await, RobotsDecision::Allowed);
    assert_eq!(cache.decide(ORIGIN).await, RobotsDecision::Allowed);
    assert_eq!(source.fetches(), 1);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_expired_entry_is_refetched() {
    let source = ScriptedSource::new(Reply::NotFound);
    let cache = RobotsCache::in_memory(&config(), UA, source.clone());
    let t0 = Utc::now();

    cache.decide_at(ORIGIN, t0).await;
    cache.decide_at(ORIGIN, t0 + ChronoDuration::seconds(3600)).await;
    assert_eq!(source.fetches(), 1);

    cache.decide_at(ORIGIN, t0 + ChronoDuration::seconds(3601)).await;
    assert_eq!(source.fetches(), 2);
}

#[tokio::test]
async fn test_origins_are_cached_independently() {
    let source = ScriptedSource::new(Reply::NotFound);
    let cache = RobotsCache::in_memory(&config(), UA, source.clone());

    cache.decide("https://a.test").await;
    cache.decide("https://b.test").await;
    cache.decide("http://a.test").await;
    assert_eq!(source.fetches(), 3);
}

#[tokio::test]
async fn test_concurrent_lookups_fetch_once() {
    let source = ScriptedSource::slow(Reply::Body("User-agent: *\nDisallow: /"), Duration::from_millis(50));
    let cache = RobotsCache::in_memory(&config(), UA, source.clone());

    let decisions = futures::future::join_all((0..20).map(|_| cache.decide(ORIGIN))).await;

    assert_eq!(source.fetches(), 1);
    assert!(decisions.iter().all(|d| *d == RobotsDecision::Disallowed));
}

#[tokio::test]
async fn test_zero_ttl_still_shares_one_fetch() {
    let config = RobotsConfig {
        ttl_seconds: 0,
        ..config()
    };
    let source = ScriptedSource::slow(Reply::NotFound, Duration::from_millis(50));
    let cache = RobotsCache::in_memory(&config, UA, source.clone());

    let decisions = futures::future::join_all((0..20).map(|_| cache.decide(ORIGIN))).await;
    assert_eq!(source.fetches(), 1);
    assert!(decisions.iter().all(|d| d.is_allowed()));

    // Nothing is reused once the shared fetch has landed.
    cache.decide(ORIGIN).await;
    assert_eq!(source.fetches(), 2);
}

#[tokio::test]
async fn test_waiters_take_the_result_of_a_slow_refresh() {
    // The fetch outlives the TTL measured from the callers' clock.
    let config = RobotsConfig {
        ttl_seconds: 1,
        ..config()
    };
    let source = ScriptedSource::slow(Reply::Body("User-agent: *\nDisallow: /"), Duration::from_millis(1200));
    let cache = RobotsCache::in_memory(&config, UA, source.clone());

    let decisions = futures::future::join_all((0..5).map(|_| cache.decide(ORIGIN))).await;
    assert_eq!(source.fetches(), 1);
    assert!(decisions.iter().all(|d| *d == RobotsDecision::Disallowed));
}

// ============================================================================
// Decisions & Fallbacks
// ============================================================================

#[tokio::test]
async fn test_missing_robots_file_allows() {
    let cache = RobotsCache::in_memory(&config(), UA, ScriptedSource::new(Reply::NotFound));
    assert!(cache.decide(ORIGIN).await.is_allowed());
}

#[tokio::test]
async fn test_root_disallow_for_matching_agent_blocks() {
    let body = "User-agent: tierfetch-test\nDisallow: /\n\nUser-agent: *\nAllow: /";
    let cache = RobotsCache::in_memory(&config(), UA, ScriptedSource::new(Reply::Body(body)));
    assert_eq!(cache.decide(ORIGIN).await, RobotsDecision::Disallowed);
}

#[tokio::test]
async fn test_fetch_failure_uses_configured_default() {
    let allow = RobotsCache::in_memory(&config(), UA, ScriptedSource::new(Reply::Fail));
    assert_eq!(allow.decide(ORIGIN).await, RobotsDecision::Allowed);

    let deny_config = RobotsConfig {
        default_on_fetch_failure: RobotsDefault::Deny,
        ..config()
    };
    let source = ScriptedSource::new(Reply::Fail);
    let deny = RobotsCache::in_memory(&deny_config, UA, source.clone());
    assert_eq!(deny.decide(ORIGIN).await, RobotsDecision::Disallowed);

    // The fallback is cached like any other decision.
    deny.decide(ORIGIN).await;
    assert_eq!(source.fetches(), 1);
}

#[tokio::test]
async fn test_fetch_failure_keeps_stale_decision() {
    let source = ScriptedSource::new(Reply::Body("User-agent: *\nDisallow: /"));
    let cache = RobotsCache::in_memory(&config(), UA, source.clone());
    let t0 = Utc::now();

    assert_eq!(cache.decide_at(ORIGIN, t0).await, RobotsDecision::Disallowed);

    source.set(Reply::Fail);
    let later = t0 + ChronoDuration::seconds(7200);
    assert_eq!(cache.decide_at(ORIGIN, later).await, RobotsDecision::Disallowed);
    assert_eq!(source.fetches(), 2);

    let entry = cache.get(ORIGIN).unwrap();
    assert!(!entry.is_stale_at(later));
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn test_restart_within_ttl_does_not_refetch() {
    let dir = TempDir::new().unwrap();
    let config = persisted_config(&dir);

    let first = RobotsCache::open(&config, UA, ScriptedSource::new(Reply::Body("User-agent: *\nDisallow: /"))).await;
    assert_eq!(first.decide(ORIGIN).await, RobotsDecision::Disallowed);
    first.flush().await.unwrap();

    let source = ScriptedSource::new(Reply::NotFound);
    let second = RobotsCache::open(&config, UA, source.clone()).await;
    assert_eq!(second.len(), 1);
    assert_eq!(second.decide(ORIGIN).await, RobotsDecision::Disallowed);
    assert_eq!(source.fetches(), 0);
}

#[tokio::test]
async fn test_restart_after_ttl_refetches() {
    let dir = TempDir::new().unwrap();
    let config = persisted_config(&dir);

    let first = RobotsCache::open(&config, UA, ScriptedSource::new(Reply::NotFound)).await;
    first
        .decide_at(ORIGIN, Utc::now() - ChronoDuration::seconds(7200))
        .await;
    first.flush().await.unwrap();

    let source = ScriptedSource::new(Reply::NotFound);
    let second = RobotsCache::open(&config, UA, source.clone()).await;
    second.decide(ORIGIN).await;
    assert_eq!(source.fetches(), 1);
}

#[tokio::test]
async fn test_corrupt_cache_file_starts_empty() {
    let dir = TempDir::new().unwrap();
    let config = persisted_config(&dir);
    std::fs::write(&config.cache_file_path, "{ not json").unwrap();

    let source = ScriptedSource::new(Reply::NotFound);
    let cache = RobotsCache::open(&config, UA, source.clone()).await;
    assert!(cache.is_empty());

    cache.decide(ORIGIN).await;
    assert_eq!(source.fetches(), 1);
}

#[tokio::test]
async fn test_flushes_after_configured_number_of_writes() {
    let dir = TempDir::new().unwrap();
    let config = RobotsConfig {
        flush_every: 2,
        ..persisted_config(&dir)
    };
    let cache = RobotsCache::open(&config, UA, ScriptedSource::new(Reply::NotFound)).await;

    cache.decide("https://a.test").await;
    assert!(!config.cache_file_path.exists());

    cache.decide("https://b.test").await;
    let raw = std::fs::read_to_string(&config.cache_file_path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(value.get("https://a.test").is_some());
    assert!(value["https://b.test"]["allowed"].as_bool().unwrap());
}

#[tokio::test]
async fn test_in_memory_cache_never_writes() {
    let cache = RobotsCache::in_memory(&config(), UA, ScriptedSource::new(Reply::NotFound));
    cache.decide(ORIGIN).await;
    cache.flush().await.unwrap();
}

// ============================================================================
// HTTP Source
// ============================================================================

fn http_source() -> HttpRobotsSource {
    let client = HttpClient::from_config(&GeneralConfig::default(), &HttpConfig::default(), None).unwrap();
    HttpRobotsSource::new(client, Duration::from_secs(2))
}

#[tokio::test]
async fn test_http_source_classifies_responses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"))
        .mount(&server)
        .await;

    let body = http_source().fetch_robots(&server.uri()).await.unwrap();
    assert_eq!(body, RobotsBody::Found("User-agent: *\nDisallow: /private".to_string()));
}

#[tokio::test]
async fn test_http_source_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let body = http_source().fetch_robots(&server.uri()).await.unwrap();
    assert_eq!(body, RobotsBody::NotFound);
}

#[tokio::test]
async fn test_http_source_server_error_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = http_source().fetch_robots(&server.uri()).await.unwrap_err();
    assert!(matches!(err, RobotsFetchError::Status(500)));
}

#[tokio::test]
async fn test_html_robots_body_falls_back_to_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>Disallow: /</body></html>"))
        .mount(&server)
        .await;

    let err = http_source().fetch_robots(&server.uri()).await.unwrap_err();
    assert!(matches!(err, RobotsFetchError::Malformed(_)));

    let cache = RobotsCache::in_memory(&config(), UA, Arc::new(http_source()));
    // Served an HTML page, so the default (allow) applies.
    assert_eq!(cache.decide(&server.uri()).await, RobotsDecision::Allowed);
}
