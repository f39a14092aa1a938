//! Escalation policy.
//!
//! Decides from an HTTP result alone whether the URL is worth a browser
//! attempt. No I/O and no state: the same result and thresholds always give
//! the same answer.

use tierfetch_core::{EscalationConfig, FailureKind, FetchResult};

/// Returns true if the HTTP result should be retried in the browser tier.
///
/// Rules, first match wins:
/// 1. robots blocks and captchas never escalate; the browser would hit the
///    same wall.
/// 2. HTTP errors, transport errors, and timeouts escalate.
/// 3. A success with fewer than `min_bytes_for_escalation` bytes escalates.
/// 4. With `latency_trigger`, a success slower than `latency_threshold_ms`
///    escalates.
/// 5. Anything else stays on HTTP.
pub fn should_escalate(result: &FetchResult, config: &EscalationConfig) -> bool {
    match result.failure_kind {
        FailureKind::RobotsBlocked | FailureKind::Captcha => false,
        FailureKind::HttpError | FailureKind::TransportError | FailureKind::Timeout => true,
        FailureKind::None => {
            if !result.success {
                return false;
            }
            if result.content_bytes < config.min_bytes_for_escalation {
                return true;
            }
            config.latency_trigger && result.latency_ms > config.latency_threshold_ms
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierfetch_core::Tier;

    fn success(bytes: u64, latency_ms: u64) -> FetchResult {
        FetchResult::builder("https://a.test/", "https://a.test", Tier::Http)
            .status(200)
            .content_bytes(bytes)
            .latency_ms(latency_ms)
            .build()
    }

    fn failure(kind: FailureKind, status: Option<u16>, bytes: u64) -> FetchResult {
        FetchResult::builder("https://a.test/", "https://a.test", Tier::Http)
            .status_code(status)
            .content_bytes(bytes)
            .latency_ms(99_999)
            .failure(kind)
            .build()
    }

    #[test]
    fn test_blocked_and_captcha_never_escalate() {
        let mut config = EscalationConfig::default();
        config.latency_trigger = true;
        config.latency_threshold_ms = 0;
        for kind in [FailureKind::RobotsBlocked, FailureKind::Captcha] {
            for status in [None, Some(200), Some(403), Some(503)] {
                assert!(!should_escalate(&failure(kind, status, 0), &config));
            }
        }
    }

    #[test]
    fn test_errors_always_escalate() {
        let mut config = EscalationConfig::default();
        config.min_bytes_for_escalation = 0;
        for kind in [
            FailureKind::HttpError,
            FailureKind::TransportError,
            FailureKind::Timeout,
        ] {
            for status in [None, Some(200), Some(404), Some(500)] {
                assert!(should_escalate(&failure(kind, status, 1_000_000), &config));
            }
        }
    }

    #[test]
    fn test_byte_threshold_boundary() {
        let mut config = EscalationConfig::default();
        config.min_bytes_for_escalation = 1000;
        assert!(should_escalate(&success(999, 10), &config));
        assert!(!should_escalate(&success(1000, 10), &config));
        assert!(!should_escalate(&success(1001, 10), &config));
    }

    #[test]
    fn test_latency_trigger() {
        let mut config = EscalationConfig::default();
        config.min_bytes_for_escalation = 10;
        config.latency_threshold_ms = 5000;

        assert!(!should_escalate(&success(100, 60_000), &config));

        config.latency_trigger = true;
        assert!(should_escalate(&success(100, 5001), &config));
        assert!(!should_escalate(&success(100, 5000), &config));
    }

    #[test]
    fn test_is_deterministic() {
        let config = EscalationConfig::default();
        let result = success(10, 10);
        let first = should_escalate(&result, &config);
        assert!((0..10).all(|_| should_escalate(&result, &config) == first));
    }
}
