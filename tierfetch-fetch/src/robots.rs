//! Origin-level robots.txt permission cache.
//!
//! The cache answers "may this origin be fetched at all". Path-level rules
//! are ignored. Decisions live for a TTL, are persisted to a JSON file, and
//! are fetched at most once at a time per origin: concurrent callers for the
//! same missing or stale origin wait for the one in-flight fetch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use tierfetch_core::{RobotsCacheEntry, RobotsConfig, RobotsDecision, RobotsDefault};
use tierfetch_store::{RobotsFile, StoreError};

use crate::error::RobotsFetchError;
use crate::host::http::HttpClient;

// ============================================================================
// Robots Source
// ============================================================================

/// A retrieved robots file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobotsBody {
    /// The origin serves a robots file.
    Found(String),
    /// The origin has no robots file (404).
    NotFound,
}

/// Retrieves robots.txt for an origin.
#[async_trait]
pub trait RobotsSource: Send + Sync {
    /// Fetches `origin/robots.txt`.
    async fn fetch_robots(&self, origin: &str) -> Result<RobotsBody, RobotsFetchError>;
}

/// Fetches robots.txt over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRobotsSource {
    client: HttpClient,
    timeout: Duration,
}

impl HttpRobotsSource {
    /// Creates a source using the shared client and a dedicated timeout.
    pub fn new(client: HttpClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl RobotsSource for HttpRobotsSource {
    async fn fetch_robots(&self, origin: &str) -> Result<RobotsBody, RobotsFetchError> {
        let url = format!("{}/robots.txt", origin.trim_end_matches('/'));
        let response = self
            .client
            .get_with_timeout(&url, self.timeout)
            .await
            .map_err(|e| RobotsFetchError::Network(e.to_string()))?;

        match response.status().as_u16() {
            200 => {}
            404 => return Ok(RobotsBody::NotFound),
            status => return Err(RobotsFetchError::Status(status)),
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RobotsFetchError::Network(e.to_string()))?;
        let body = String::from_utf8(bytes.to_vec())
            .map_err(|_| RobotsFetchError::Malformed("body is not UTF-8".to_string()))?;
        if body.trim_start().starts_with('<') {
            return Err(RobotsFetchError::Malformed(
                "HTML served in place of robots.txt".to_string(),
            ));
        }
        Ok(RobotsBody::Found(body))
    }
}

// ============================================================================
// Parsing
// ============================================================================

#[derive(Debug, Default)]
struct Group {
    agents: Vec<String>,
    disallow_root: bool,
    allow_root: bool,
    has_rules: bool,
}

/// Computes the origin-level decision of a robots file for `user_agent`.
///
/// The group naming our agent wins over `*`. It denies the origin when it
/// disallows `/` (or `/*`) without also allowing `/`.
pub fn parse_robots(body: &str, user_agent: &str) -> RobotsDecision {
    let mut groups: Vec<Group> = Vec::new();

    for raw in body.lines() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key.trim().to_ascii_lowercase().as_str() {
            "user-agent" => {
                let starts_group = groups.last().is_none_or(|g| g.has_rules);
                if starts_group {
                    groups.push(Group::default());
                }
                if let Some(group) = groups.last_mut() {
                    group.agents.push(value.to_ascii_lowercase());
                }
            }
            "disallow" => {
                if let Some(group) = groups.last_mut() {
                    group.has_rules = true;
                    if value == "/" || value == "/*" {
                        group.disallow_root = true;
                    }
                }
            }
            "allow" => {
                if let Some(group) = groups.last_mut() {
                    group.has_rules = true;
                    if value == "/" {
                        group.allow_root = true;
                    }
                }
            }
            _ => {}
        }
    }

    let ua = user_agent.to_ascii_lowercase();
    let names_us = |g: &&Group| {
        g.agents
            .iter()
            .any(|a| !a.is_empty() && a != "*" && ua.contains(a.as_str()))
    };
    let wildcard = |g: &&Group| g.agents.iter().any(|a| a == "*");

    let specific: Vec<&Group> = groups.iter().filter(names_us).collect();
    let applicable = if specific.is_empty() {
        groups.iter().filter(wildcard).collect()
    } else {
        specific
    };

    let disallow = applicable.iter().any(|g| g.disallow_root);
    let allow = applicable.iter().any(|g| g.allow_root);
    RobotsDecision::from_allowed(!disallow || allow)
}

// ============================================================================
// Robots Cache
// ============================================================================

/// One robots fetch shared by every caller that joins it.
type Flight = Arc<tokio::sync::Mutex<Option<RobotsDecision>>>;

/// TTL-bounded, persisted, single-flight robots decision cache.
pub struct RobotsCache {
    source: Arc<dyn RobotsSource>,
    file: Option<RobotsFile>,
    entries: RwLock<HashMap<String, RobotsCacheEntry>>,
    in_flight: Mutex<HashMap<String, Flight>>,
    flush_lock: tokio::sync::Mutex<()>,
    unflushed: AtomicUsize,
    ttl: chrono::Duration,
    default_decision: RobotsDecision,
    flush_every: usize,
    user_agent: String,
}

impl RobotsCache {
    /// Opens the cache backed by the configured file.
    ///
    /// A missing or corrupt file starts an empty cache.
    pub async fn open(
        config: &RobotsConfig,
        user_agent: &str,
        source: Arc<dyn RobotsSource>,
    ) -> Self {
        let file = RobotsFile::new(&config.cache_file_path);
        let entries = file.load().await;
        info!(
            path = %file.path().display(),
            entries = entries.len(),
            "Opened robots cache"
        );
        Self::with_entries(config, user_agent, source, Some(file), entries)
    }

    /// Creates a cache that is never persisted.
    pub fn in_memory(config: &RobotsConfig, user_agent: &str, source: Arc<dyn RobotsSource>) -> Self {
        Self::with_entries(config, user_agent, source, None, HashMap::new())
    }

    fn with_entries(
        config: &RobotsConfig,
        user_agent: &str,
        source: Arc<dyn RobotsSource>,
        file: Option<RobotsFile>,
        entries: HashMap<String, RobotsCacheEntry>,
    ) -> Self {
        let default_decision = match config.default_on_fetch_failure {
            RobotsDefault::Allow => RobotsDecision::Allowed,
            RobotsDefault::Deny => RobotsDecision::Disallowed,
        };
        Self {
            source,
            file,
            entries: RwLock::new(entries),
            in_flight: Mutex::new(HashMap::new()),
            flush_lock: tokio::sync::Mutex::new(()),
            unflushed: AtomicUsize::new(0),
            ttl: config.ttl(),
            default_decision,
            flush_every: config.flush_every.max(1),
            user_agent: user_agent.to_string(),
        }
    }

    /// Returns the decision for an origin, fetching robots.txt if needed.
    pub async fn decide(&self, origin: &str) -> RobotsDecision {
        self.decide_at(origin, Utc::now()).await
    }

    /// Returns the decision for an origin as of `now`.
    ///
    /// Callers that queue behind an in-flight fetch for the same origin
    /// take its result, whatever the TTL. The refreshed entry is stamped
    /// with `now`.
    #[instrument(skip(self, now), fields(origin = %origin))]
    pub async fn decide_at(&self, origin: &str, now: DateTime<Utc>) -> RobotsDecision {
        if let Some(decision) = self.fresh(origin, now) {
            return decision;
        }

        let flight = self.join_flight(origin);
        let mut slot = flight.lock().await;
        if let Some(decision) = *slot {
            return decision;
        }

        // Refreshed by a flight that finished before this one was created.
        if let Some(decision) = self.fresh(origin, now) {
            *slot = Some(decision);
            drop(slot);
            self.land_flight(origin, &flight);
            return decision;
        }

        let stale = self.get(origin).map(|e| e.decision());
        let decision = match self.source.fetch_robots(origin).await {
            Ok(RobotsBody::Found(body)) => parse_robots(&body, &self.user_agent),
            Ok(RobotsBody::NotFound) => RobotsDecision::Allowed,
            Err(e) => {
                let fallback = stale.unwrap_or(self.default_decision);
                warn!(error = %e, fallback = %fallback, stale = stale.is_some(), "Robots fetch failed");
                fallback
            }
        };
        debug!(decision = %decision, "Robots decision refreshed");

        let entry = RobotsCacheEntry::new(origin, decision, now, self.ttl);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(origin.to_string(), entry);

        *slot = Some(decision);
        drop(slot);
        self.land_flight(origin, &flight);

        let pending = self.unflushed.fetch_add(1, Ordering::AcqRel) + 1;
        if pending >= self.flush_every {
            self.flush_logged().await;
        }

        decision
    }

    fn fresh(&self, origin: &str, now: DateTime<Utc>) -> Option<RobotsDecision> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(origin)
            .filter(|e| !e.is_stale_at(now))
            .map(RobotsCacheEntry::decision)
    }

    fn join_flight(&self, origin: &str) -> Flight {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(in_flight.entry(origin.to_string()).or_default())
    }

    /// Retires a finished flight so later lookups start a new one.
    fn land_flight(&self, origin: &str, flight: &Flight) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight.get(origin).is_some_and(|f| Arc::ptr_eq(f, flight)) {
            in_flight.remove(origin);
        }
    }

    /// Returns the cached entry for an origin, fresh or stale.
    pub fn get(&self, origin: &str) -> Option<RobotsCacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(origin)
            .cloned()
    }

    /// Returns the number of cached origins.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes all entries to the cache file.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let _guard = self.flush_lock.lock().await;

        let snapshot: Vec<RobotsCacheEntry> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        self.unflushed.store(0, Ordering::Release);

        file.save(&snapshot).await?;
        debug!(entries = snapshot.len(), "Flushed robots cache");
        Ok(())
    }

    /// Flushes, logging instead of returning a failure.
    pub async fn flush_logged(&self) {
        if let Err(e) = self.flush().await {
            warn!(error = %e, "Failed to persist robots cache");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const UA: &str = "Mozilla/5.0 (compatible; TierBot/1.0)";

    #[test]
    fn test_wildcard_disallow_root() {
        let body = "User-agent: *\nDisallow: /\n";
        assert_eq!(parse_robots(body, UA), RobotsDecision::Disallowed);
    }

    #[test]
    fn test_path_rules_do_not_deny_origin() {
        let body = "User-agent: *\nDisallow: /admin\nDisallow: /private/*\n";
        assert_eq!(parse_robots(body, UA), RobotsDecision::Allowed);
    }

    #[test]
    fn test_empty_disallow_allows() {
        assert_eq!(parse_robots("User-agent: *\nDisallow:\n", UA), RobotsDecision::Allowed);
        assert_eq!(parse_robots("", UA), RobotsDecision::Allowed);
    }

    #[test]
    fn test_allow_root_overrides_disallow_root() {
        let body = "User-agent: *\nDisallow: /*\nAllow: /\n";
        assert_eq!(parse_robots(body, UA), RobotsDecision::Allowed);
    }

    #[test]
    fn test_specific_group_wins_over_wildcard() {
        let body = "\
User-agent: *
Disallow: /

User-agent: tierbot
Disallow: /tmp
";
        assert_eq!(parse_robots(body, UA), RobotsDecision::Allowed);

        let body = "\
User-agent: TierBot
Disallow: /

User-agent: *
Allow: /
";
        assert_eq!(parse_robots(body, UA), RobotsDecision::Disallowed);
    }

    #[test]
    fn test_consecutive_agents_share_group() {
        let body = "\
User-agent: googlebot
User-agent: tierbot
Disallow: /
";
        assert_eq!(parse_robots(body, UA), RobotsDecision::Disallowed);
        assert_eq!(parse_robots(body, "curl/8.0"), RobotsDecision::Allowed);
    }

    #[test]
    fn test_comments_and_case() {
        let body = "# robots\nUSER-AGENT: * # everyone\nDISALLOW: / # all\n";
        assert_eq!(parse_robots(body, UA), RobotsDecision::Disallowed);
    }

    #[test]
    fn test_rules_before_any_group_are_ignored() {
        let body = "Disallow: /\nUser-agent: *\nAllow: /public\n";
        assert_eq!(parse_robots(body, UA), RobotsDecision::Allowed);
    }
}
