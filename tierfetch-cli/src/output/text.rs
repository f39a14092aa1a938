//! Text output formatting with colors.

use tierfetch_core::{FailureKind, HybridResult};

use super::RobotsOutput;
use crate::commands::run::RunSummary;

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";

const OK_MARK: char = '✓';
const FAIL_MARK: char = '✗';

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Column header for result rows.
    pub fn format_header(&self) -> String {
        self.bold(&format!(
            "  {:<8} {:>6} {:<16} {:>10} {:>9}  {}",
            "TIER", "STATUS", "KIND", "BYTES", "LATENCY", "URL"
        ))
    }

    /// Formats one result as an aligned row.
    pub fn format_result(&self, hybrid: &HybridResult) -> String {
        let result = &hybrid.result;
        let mark = if result.success {
            self.green(&OK_MARK.to_string())
        } else {
            self.red(&FAIL_MARK.to_string())
        };

        let tier = format!("{:<8}", result.tier.display_name());
        let tier = if hybrid.escalated() {
            self.cyan(&tier)
        } else {
            tier
        };

        let status = result
            .status_code
            .map_or_else(|| "-".to_string(), |s| s.to_string());
        let kind = format!("{:<16}", result.failure_kind.label());
        let kind = match result.failure_kind {
            FailureKind::None => self.dim(&kind),
            FailureKind::RobotsBlocked | FailureKind::Captcha => self.yellow(&kind),
            _ => self.red(&kind),
        };

        let mut row = format!(
            "{mark} {tier} {status:>6} {kind} {:>10} {:>9}  {}",
            format_bytes(result.content_bytes),
            format!("{} ms", result.latency_ms),
            hybrid.url
        );
        if hybrid.escalation_suppressed {
            row.push_str(&self.dim(" (escalation suppressed)"));
        }
        if let Some(error) = &result.error {
            row.push_str(&self.dim(&format!(" [{error}]")));
        }
        row
    }

    /// Formats the end-of-run tally.
    pub fn format_summary(&self, summary: &RunSummary) -> String {
        format!(
            "{} fetched, {} ok, {} failed, {} escalated, {} suppressed, {} blocked by robots.txt",
            self.bold(&summary.total.to_string()),
            self.green(&summary.succeeded.to_string()),
            self.red(&summary.failed().to_string()),
            summary.escalated,
            summary.suppressed,
            summary.robots_blocked
        )
    }

    /// Formats a robots decision.
    pub fn format_robots(&self, output: &RobotsOutput) -> String {
        let decision = if output.allowed {
            self.green("allowed")
        } else {
            self.red("disallowed")
        };
        let source = if output.cached { "cached" } else { "fetched" };
        let mut line = format!("{} {decision} ({source})", self.bold(&output.origin));
        if let Some(expiry) = output.ttl_expiry {
            line.push_str(&self.dim(&format!(", expires {}", expiry.to_rfc3339())));
        }
        line
    }

    // ========================================================================
    // Color Helpers
    // ========================================================================

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_colors {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        self.paint(BOLD, text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint(DIM, text)
    }

    fn green(&self, text: &str) -> String {
        self.paint(GREEN, text)
    }

    fn yellow(&self, text: &str) -> String {
        self.paint(YELLOW, text)
    }

    fn red(&self, text: &str) -> String {
        self.paint(RED, text)
    }

    fn cyan(&self, text: &str) -> String {
        self.paint(CYAN, text)
    }
}

/// Formats a byte count with a binary unit.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    match bytes {
        b if b >= MIB => format!("{:.1} MiB", b as f64 / MIB as f64),
        b if b >= KIB => format!("{:.1} KiB", b as f64 / KIB as f64),
        b => format!("{b} B"),
    }
}
