//! Two-tier fetch pipeline.
//!
//! Per URL, strictly in order: robots check, HTTP attempt, escalation
//! decision, browser attempt, merge. Many URLs move through this sequence
//! concurrently and results stream out as they complete, in no particular
//! order.

use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use tierfetch_core::{
    Config, FailureKind, FetchResult, HybridResult, ProxySettings, Route, Tier, parse_url,
};

use crate::captcha::{CaptchaDetector, MarkerCaptchaDetector};
use crate::error::FetchError;
use crate::fetcher::{BrowserFetcher, EscalationBudget, Fetcher, HttpFetcher};
use crate::host::browser::{BrowserEngine, ChromiumEngine, ChromiumOptions};
use crate::host::http::HttpClient;
use crate::policy::should_escalate;
use crate::retry::RetryStrategy;
use crate::robots::{HttpRobotsSource, RobotsCache, RobotsSource};

// ============================================================================
// Pipeline
// ============================================================================

/// Orchestrates the robots cache, both fetch tiers, and the policy.
pub struct Pipeline {
    config: Config,
    robots: RobotsCache,
    http: Fetcher,
    browser: Fetcher,
}

impl Pipeline {
    /// Starts building a pipeline for the given configuration.
    pub fn builder(config: Config) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// Returns the effective configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the robots cache.
    pub fn robots(&self) -> &RobotsCache {
        &self.robots
    }

    /// Returns the fetcher for a tier.
    pub fn fetcher(&self, tier: Tier) -> &Fetcher {
        match tier {
            Tier::Http => &self.http,
            Tier::Browser => &self.browser,
        }
    }

    /// Runs the pipeline over `urls`, yielding one result per URL.
    ///
    /// Inputs are pulled lazily and at most `http.concurrency +
    /// browser.pool_size` URLs are in flight. Each call is an independent
    /// run with its own escalation budget. The robots cache is flushed
    /// after the last result.
    pub fn run<I>(&self, urls: I) -> impl Stream<Item = HybridResult> + Send + '_
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: Send + 'static,
    {
        let budget = Arc::new(EscalationBudget::new(self.config.browser.max_escalations));
        let limit = self.config.max_in_flight();
        info!(
            max_in_flight = limit,
            max_escalations = self.config.browser.max_escalations,
            "Starting fetch run"
        );

        let results = stream::iter(urls)
            .map(move |url| {
                let budget = Arc::clone(&budget);
                async move { self.process(url, &budget).await }
            })
            .buffer_unordered(limit)
            .map(Some);

        let finish = stream::once(async move {
            self.robots.flush_logged().await;
            info!("Fetch run finished");
            None
        });

        results.chain(finish).filter_map(futures::future::ready)
    }

    /// Flushes the robots cache and releases both tiers.
    ///
    /// Call once the last run has been drained. The browser process, if
    /// one was launched, is closed and its handler task awaited.
    pub async fn shutdown(&self) {
        self.robots.flush_logged().await;
        for tier in [Tier::Http, Tier::Browser] {
            let fetcher = self.fetcher(tier);
            debug!(tier = %fetcher.tier(), "Shutting down tier");
            fetcher.shutdown().await;
        }
        info!("Pipeline shut down");
    }

    /// Runs the pipeline and collects every result.
    pub async fn run_collect<I>(&self, urls: I) -> Vec<HybridResult>
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: Send + 'static,
    {
        self.run(urls).collect().await
    }

    #[instrument(skip(self, budget), fields(url = %url))]
    async fn process(&self, url: String, budget: &EscalationBudget) -> HybridResult {
        let Some(parsed) = parse_url(&url) else {
            warn!("Invalid URL");
            let result = FetchResult::builder(url, "", Tier::Http)
                .failure(FailureKind::TransportError)
                .error("invalid URL")
                .build();
            return HybridResult::http_only(result);
        };
        let origin = parsed.origin().ascii_serialization();
        let url = parsed.as_str();

        if !self.robots.decide(&origin).await.is_allowed() {
            info!(origin = %origin, "Blocked by robots.txt");
            return HybridResult::http_only(FetchResult::robots_blocked(url, origin));
        }

        let http = self.http.fetch(url).await;
        if !should_escalate(&http, &self.config.escalation) {
            debug!(kind = %http.failure_kind, bytes = http.content_bytes, "Staying on HTTP");
            return HybridResult::http_only(http);
        }

        if !budget.try_reserve() {
            info!(kind = %http.failure_kind, "Escalation ceiling reached");
            return HybridResult::suppressed(http);
        }

        debug!(kind = %http.failure_kind, remaining = budget.remaining(), "Escalating to browser");
        let browser = self.browser.fetch(url).await;
        let hybrid = HybridResult::merge(http, browser);
        debug!(
            chosen = %hybrid.chosen_tier,
            kind = %hybrid.result.failure_kind,
            "Merged tiers"
        );
        hybrid
    }
}

// ============================================================================
// Pipeline Builder
// ============================================================================

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    config: Config,
    proxy: Option<ProxySettings>,
    engine: Option<Arc<dyn BrowserEngine>>,
    robots_source: Option<Arc<dyn RobotsSource>>,
    captcha: Option<Arc<dyn CaptchaDetector>>,
    retry: Option<RetryStrategy>,
    persist_robots: bool,
}

impl PipelineBuilder {
    /// Creates a builder with the production collaborators.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            proxy: None,
            engine: None,
            robots_source: None,
            captcha: None,
            retry: None,
            persist_robots: true,
        }
    }

    /// Routes traffic through a proxy (when `general.use_proxy` is set).
    pub fn proxy(mut self, proxy: Option<ProxySettings>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Replaces the Chromium engine.
    pub fn browser_engine(mut self, engine: Arc<dyn BrowserEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Replaces the HTTP robots source.
    pub fn robots_source(mut self, source: Arc<dyn RobotsSource>) -> Self {
        self.robots_source = Some(source);
        self
    }

    /// Replaces the marker captcha detector.
    pub fn captcha_detector(mut self, detector: Arc<dyn CaptchaDetector>) -> Self {
        self.captcha = Some(detector);
        self
    }

    /// Overrides the retry strategy derived from the HTTP config.
    pub fn retry_strategy(mut self, retry: RetryStrategy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Keeps the robots cache in memory only.
    pub fn ephemeral_robots(mut self) -> Self {
        self.persist_robots = false;
        self
    }

    /// Validates the configuration and assembles the pipeline.
    pub async fn build(self) -> Result<Pipeline, FetchError> {
        let config = self.config;
        config.validate()?;

        let proxy = self.proxy.filter(|_| config.general.use_proxy);
        let client = HttpClient::from_config(&config.general, &config.http, proxy.as_ref())?;

        let detector: Arc<dyn CaptchaDetector> = match self.captcha {
            Some(detector) => detector,
            None => Arc::new(MarkerCaptchaDetector::from_config(&config.general)?),
        };

        let source: Arc<dyn RobotsSource> = self.robots_source.unwrap_or_else(|| {
            Arc::new(HttpRobotsSource::new(
                client.clone(),
                config.robots.fetch_timeout(),
            ))
        });
        let user_agent = config.general.user_agent.as_str();
        let robots = if self.persist_robots {
            RobotsCache::open(&config.robots, user_agent, source).await
        } else {
            RobotsCache::in_memory(&config.robots, user_agent, source)
        };

        let engine: Arc<dyn BrowserEngine> = self.engine.unwrap_or_else(|| {
            Arc::new(ChromiumEngine::new(ChromiumOptions::from_config(
                &config.general,
                &config.browser,
                proxy.as_ref(),
            )))
        });

        let mut http = HttpFetcher::new(client, &config.http, Arc::clone(&detector));
        if let Some(retry) = self.retry {
            http = http.with_retry(retry);
        }
        let browser = BrowserFetcher::new(engine, &config.browser, detector)
            .with_route(Route::from_proxy(proxy.is_some()));

        Ok(Pipeline {
            config,
            robots,
            http: Fetcher::Http(http),
            browser: Fetcher::Browser(browser),
        })
    }
}
