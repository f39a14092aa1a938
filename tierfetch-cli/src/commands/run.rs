//! Run command - stream URLs through the pipeline.

use anyhow::{Context, Result, bail};
use clap::Args;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::info;

use tierfetch_core::{FailureKind, HybridResult};
use tierfetch_fetch::Pipeline;

use super::load_settings;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// URLs to fetch.
    pub urls: Vec<String>,

    /// Newline-separated URL file ("-" for stdin).
    #[arg(long, short)]
    pub input: Option<PathBuf>,

    /// Never escalate to the browser tier.
    #[arg(long)]
    pub no_browser: bool,
}

/// Runs the run command.
pub async fn run(args: &RunArgs, cli: &Cli) -> Result<ExitCode> {
    let (mut config, proxy) = load_settings(cli)?;
    if args.no_browser {
        config.browser.max_escalations = 0;
    }

    let mut urls = args.urls.clone();
    if let Some(input) = &args.input {
        urls.extend(parse_url_list(&read_input(input).await?));
    }
    if urls.is_empty() {
        bail!("no URLs given (pass them as arguments or with --input)");
    }

    let pipeline = Pipeline::builder(config)
        .proxy(proxy)
        .build()
        .await
        .context("failed to start pipeline")?;
    info!(urls = urls.len(), "Fetching");

    let text = TextFormatter::new(!cli.no_color);
    let json = JsonFormatter::new(false);
    if cli.format == OutputFormat::Text {
        println!("{}", text.format_header());
    }

    let mut summary = RunSummary::default();
    let streamed = async {
        let results = pipeline.run(urls);
        tokio::pin!(results);
        while let Some(result) = results.next().await {
            summary.record(&result);
            match cli.format {
                OutputFormat::Text => println!("{}", text.format_result(&result)),
                OutputFormat::Json => println!("{}", json.format(&result)?),
            }
        }
        anyhow::Ok(())
    }
    .await;
    // The exit path skips destructors, so the browser is closed here.
    pipeline.shutdown().await;
    streamed?;

    if cli.format == OutputFormat::Text && !cli.quiet {
        eprintln!("{}", text.format_summary(&summary));
    }
    info!(
        total = summary.total,
        succeeded = summary.succeeded,
        escalated = summary.escalated,
        "Run complete"
    );

    Ok(summary.exit_code())
}

async fn read_input(path: &Path) -> Result<String> {
    let mut content = String::new();
    if path == Path::new("-") {
        tokio::io::stdin()
            .read_to_string(&mut content)
            .await
            .context("failed to read URLs from stdin")?;
    } else {
        content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
    }
    Ok(content)
}

/// Extracts URLs from a newline-separated list, skipping blanks and comments.
pub(crate) fn parse_url_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

// ============================================================================
// Summary
// ============================================================================

/// Tally of a finished run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// URLs processed.
    pub total: usize,
    /// URLs whose chosen result succeeded.
    pub succeeded: usize,
    /// URLs that went to the browser tier.
    pub escalated: usize,
    /// URLs whose escalation hit the ceiling.
    pub suppressed: usize,
    /// URLs blocked by robots.txt.
    pub robots_blocked: usize,
}

impl RunSummary {
    /// Adds one result to the tally.
    pub fn record(&mut self, result: &HybridResult) {
        self.total += 1;
        if result.is_success() {
            self.succeeded += 1;
        }
        if result.escalated() {
            self.escalated += 1;
        }
        if result.escalation_suppressed {
            self.suppressed += 1;
        }
        if result.result.failure_kind == FailureKind::RobotsBlocked {
            self.robots_blocked += 1;
        }
    }

    /// Returns the failed count.
    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }

    /// Non-zero when nothing succeeded.
    pub fn exit_code(&self) -> ExitCode {
        if self.succeeded == 0 {
            ExitCode::NoSuccess
        } else {
            ExitCode::Success
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tierfetch_core::{FetchResult, Tier};

    fn http(kind: FailureKind, status: Option<u16>) -> FetchResult {
        FetchResult::builder("https://a.test/", "https://a.test", Tier::Http)
            .status_code(status)
            .content_bytes(10)
            .failure(kind)
            .build()
    }

    #[test]
    fn test_parse_url_list_skips_blanks_and_comments() {
        let content = "https://a.test/\n\n   # staging\n  https://b.test/x  \n#https://c.test/\n";
        assert_eq!(
            parse_url_list(content),
            vec!["https://a.test/".to_string(), "https://b.test/x".to_string()]
        );
    }

    #[test]
    fn test_parse_url_list_handles_crlf() {
        assert_eq!(parse_url_list("a.test\r\nb.test\r\n"), vec!["a.test", "b.test"]);
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = RunSummary::default();
        summary.record(&HybridResult::http_only(http(FailureKind::None, Some(200))));
        summary.record(&HybridResult::suppressed(http(FailureKind::HttpError, Some(403))));
        summary.record(&HybridResult::http_only(FetchResult::robots_blocked(
            "https://b.test/",
            "https://b.test",
        )));
        let browser = FetchResult::builder("https://a.test/", "https://a.test", Tier::Browser)
            .status(200)
            .content_bytes(5000)
            .build();
        summary.record(&HybridResult::merge(http(FailureKind::Timeout, None), browser));

        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed(), 2);
        assert_eq!(summary.escalated, 1);
        assert_eq!(summary.suppressed, 1);
        assert_eq!(summary.robots_blocked, 1);
        assert_eq!(summary.exit_code(), ExitCode::Success);
    }

    #[test]
    fn test_nothing_succeeded_is_non_zero_exit() {
        let mut summary = RunSummary::default();
        summary.record(&HybridResult::http_only(http(FailureKind::TransportError, None)));
        assert_eq!(summary.exit_code(), ExitCode::NoSuccess);
        assert_eq!(RunSummary::default().exit_code(), ExitCode::NoSuccess);
    }
}
