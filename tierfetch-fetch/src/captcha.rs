//! Captcha and bot-wall detection.

use regex::bytes::{Regex, RegexBuilder};
use std::fmt;

use tierfetch_core::GeneralConfig;

/// Decides whether a response body is a captcha or bot wall.
pub trait CaptchaDetector: Send + Sync + fmt::Debug {
    /// Returns true if the body looks like a captcha page.
    fn is_captcha(&self, body: &[u8]) -> bool;
}

/// Case-insensitive marker search over the head of the body.
#[derive(Debug, Clone)]
pub struct MarkerCaptchaDetector {
    pattern: Option<Regex>,
    inspect_bytes: usize,
}

impl MarkerCaptchaDetector {
    /// Builds a detector for the given markers.
    pub fn new<S: AsRef<str>>(markers: &[S], inspect_bytes: usize) -> Result<Self, regex::Error> {
        let alternatives: Vec<String> = markers
            .iter()
            .map(|m| m.as_ref())
            .filter(|m| !m.is_empty())
            .map(regex::escape)
            .collect();

        let pattern = if alternatives.is_empty() {
            None
        } else {
            Some(
                RegexBuilder::new(&alternatives.join("|"))
                    .case_insensitive(true)
                    .build()?,
            )
        };

        Ok(Self {
            pattern,
            inspect_bytes,
        })
    }

    /// Builds the detector described by the general config.
    pub fn from_config(config: &GeneralConfig) -> Result<Self, regex::Error> {
        Self::new(&config.captcha_markers, config.captcha_detection_bytes)
    }
}

impl CaptchaDetector for MarkerCaptchaDetector {
    fn is_captcha(&self, body: &[u8]) -> bool {
        let Some(pattern) = &self.pattern else {
            return false;
        };
        let head = &body[..body.len().min(self.inspect_bytes)];
        pattern.is_match(head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_detector() -> MarkerCaptchaDetector {
        MarkerCaptchaDetector::from_config(&GeneralConfig::default()).unwrap()
    }

    #[test]
    fn test_detects_markers_case_insensitively() {
        let detector = default_detector();
        assert!(detector.is_captcha(b"<title>Please complete the CAPTCHA</title>"));
        assert!(detector.is_captcha(b"Are You A Robot?"));
        assert!(!detector.is_captcha(b"<html><body>Welcome</body></html>"));
    }

    #[test]
    fn test_only_inspects_head() {
        let detector = MarkerCaptchaDetector::new(&["captcha"], 16).unwrap();
        let mut body = vec![b'a'; 32];
        body.extend_from_slice(b"captcha");
        assert!(!detector.is_captcha(&body));
        assert!(detector.is_captcha(b"0123456captcha"));
    }

    #[test]
    fn test_markers_are_literal() {
        let detector = MarkerCaptchaDetector::new(&["a.c(", ""], 100).unwrap();
        assert!(detector.is_captcha(b"xx a.c( yy"));
        assert!(!detector.is_captcha(b"abc("));
    }

    #[test]
    fn test_no_markers_never_matches() {
        let detector = MarkerCaptchaDetector::new::<&str>(&[], 100).unwrap();
        assert!(!detector.is_captcha(b"captcha"));
    }

    #[test]
    fn test_invalid_utf8_body_is_searched() {
        let detector = default_detector();
        let mut body = vec![0xff, 0xfe];
        body.extend_from_slice(b"captcha");
        assert!(detector.is_captcha(&body));
    }
}
