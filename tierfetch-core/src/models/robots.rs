//! Robots permission types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Robots Decision
// ============================================================================

/// Origin-level crawl permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotsDecision {
    /// Fetching the origin is permitted.
    Allowed,
    /// robots.txt forbids the whole origin.
    Disallowed,
}

impl RobotsDecision {
    /// Converts an `allowed` flag into a decision.
    pub fn from_allowed(allowed: bool) -> Self {
        if allowed {
            Self::Allowed
        } else {
            Self::Disallowed
        }
    }

    /// Returns true if fetching is permitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

impl fmt::Display for RobotsDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allowed => write!(f, "allowed"),
            Self::Disallowed => write!(f, "disallowed"),
        }
    }
}

// ============================================================================
// Robots Cache Entry
// ============================================================================

/// A cached robots decision for one origin.
///
/// The origin is the key of the persisted map, so it is not repeated in
/// the serialized value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotsCacheEntry {
    /// Origin this entry applies to.
    #[serde(skip)]
    pub origin: String,
    /// Whether the origin may be fetched.
    pub allowed: bool,
    /// When the decision was made.
    pub fetched_at: DateTime<Utc>,
    /// When the decision stops being trusted.
    pub ttl_expiry: DateTime<Utc>,
}

impl RobotsCacheEntry {
    /// Creates an entry fetched at `fetched_at` that lives for `ttl`.
    pub fn new(
        origin: impl Into<String>,
        decision: RobotsDecision,
        fetched_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            origin: origin.into(),
            allowed: decision.is_allowed(),
            fetched_at,
            ttl_expiry: fetched_at + ttl,
        }
    }

    /// Returns the cached decision.
    pub fn decision(&self) -> RobotsDecision {
        RobotsDecision::from_allowed(self.allowed)
    }

    /// Returns true if the entry must be refreshed before use at `now`.
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        now > self.ttl_expiry
    }

    /// Returns true if the entry is stale now.
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_fetched_plus_ttl() {
        let now = Utc::now();
        let entry = RobotsCacheEntry::new(
            "https://a.test",
            RobotsDecision::Allowed,
            now,
            Duration::seconds(60),
        );
        assert_eq!(entry.ttl_expiry, now + Duration::seconds(60));
        assert!(entry.decision().is_allowed());
    }

    #[test]
    fn test_stale_only_after_expiry() {
        let now = Utc::now();
        let entry = RobotsCacheEntry::new(
            "https://a.test",
            RobotsDecision::Disallowed,
            now,
            Duration::seconds(10),
        );
        assert!(!entry.is_stale_at(now));
        assert!(!entry.is_stale_at(entry.ttl_expiry));
        assert!(entry.is_stale_at(entry.ttl_expiry + Duration::milliseconds(1)));
    }

    #[test]
    fn test_origin_not_serialized() {
        let entry = RobotsCacheEntry::new(
            "https://a.test",
            RobotsDecision::Allowed,
            Utc::now(),
            Duration::seconds(1),
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("origin").is_none());
        assert_eq!(json["allowed"], true);
    }
}
