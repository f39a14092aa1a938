//! Browser engine abstraction and the Chromium implementation.
//!
//! A [`BrowserEngine`] hands out [`BrowserSession`]s. A session is one
//! isolated page that can be navigated many times. The engine behind the
//! sessions is opaque to the pool, so tests drive the browser tier with
//! in-process fakes.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    AuthChallengeResponse, AuthChallengeResponseResponse, ContinueRequestParams,
    ContinueWithAuthParams, EnableParams, EventAuthRequired, EventRequestPaused,
    FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, EventResponseReceived, ResourceType, SetUserAgentOverrideParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tierfetch_core::{BrowserConfig, GeneralConfig, ProxySettings};

use crate::error::BrowserError;

/// Environment variable overriding the Chromium binary.
pub const CHROMIUM_PATH_ENV: &str = "TIERFETCH_CHROMIUM_PATH";

/// How long shutdown waits for the CDP handler task to drain.
const HANDLER_GRACE: Duration = Duration::from_secs(5);

/// Reads the main document's navigation timing entry.
const NAVIGATION_TIMING_JS: &str = "(() => { \
    const e = performance.getEntriesByType('navigation')[0]; \
    return e ? { responseStatus: e.responseStatus, responseStart: e.responseStart } : null; \
})()";

// ============================================================================
// Engine Traits
// ============================================================================

/// A rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLoad {
    /// Status of the main document, if the engine reported one.
    pub status: Option<u16>,
    /// Time from navigation start to the first document byte.
    pub ttfb: Option<Duration>,
    /// Serialized DOM after load.
    pub content: String,
}

/// A source of browser sessions.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Creates a fresh, isolated session.
    async fn new_session(&self) -> Result<Box<dyn BrowserSession>, BrowserError>;

    /// Stops the engine. Sessions must be closed first.
    async fn shutdown(&self) {}
}

/// One reusable browser page.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigates to `url` and returns the rendered page.
    ///
    /// Callers bound this with a timeout; a session whose navigation was
    /// cancelled is never reused.
    async fn navigate(&mut self, url: &str) -> Result<PageLoad, BrowserError>;

    /// Releases the session's resources.
    async fn close(self: Box<Self>);
}

// ============================================================================
// Chromium Discovery
// ============================================================================

/// Finds the Chromium binary.
///
/// Lookup order: the configured path, [`CHROMIUM_PATH_ENV`], then common
/// binary names on `PATH`.
pub fn find_chromium(configured: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Some(path.clone());
        }
        warn!(path = %path.display(), "Configured Chromium path does not exist");
    }

    if let Ok(p) = std::env::var(CHROMIUM_PATH_ENV) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    ["google-chrome", "chromium", "chromium-browser", "chrome"]
        .iter()
        .find_map(|name| which::which(name).ok())
}

// ============================================================================
// Chromium Engine
// ============================================================================

/// Launch options for Chromium.
#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    /// Explicit binary path.
    pub chromium_path: Option<PathBuf>,
    /// Run without a window.
    pub headless: bool,
    /// User agent for every page.
    pub user_agent: String,
    /// UI locale.
    pub locale: String,
    /// Abort image, font, and media requests.
    pub block_heavy_resources: bool,
    /// Upstream proxy.
    pub proxy: Option<ProxySettings>,
}

impl ChromiumOptions {
    /// Builds launch options from the configuration.
    pub fn from_config(
        general: &GeneralConfig,
        browser: &BrowserConfig,
        proxy: Option<&ProxySettings>,
    ) -> Self {
        Self {
            chromium_path: browser.chromium_path.clone(),
            headless: browser.headless,
            user_agent: general.user_agent.clone(),
            locale: browser.locale.clone(),
            block_heavy_resources: browser.block_heavy_resources,
            proxy: proxy.filter(|_| general.use_proxy).cloned(),
        }
    }

    fn needs_interception(&self) -> bool {
        self.block_heavy_resources || self.proxy.as_ref().is_some_and(ProxySettings::has_credentials)
    }
}

struct LaunchedBrowser {
    browser: tokio::sync::Mutex<Browser>,
    handler: Mutex<Option<JoinHandle<()>>>,
}

/// Chromium driven over the DevTools protocol.
///
/// The browser process is launched on the first session request, so runs
/// that never escalate never start a browser.
pub struct ChromiumEngine {
    options: Arc<ChromiumOptions>,
    browser: OnceCell<LaunchedBrowser>,
}

impl ChromiumEngine {
    /// Creates an engine; nothing is launched yet.
    pub fn new(options: ChromiumOptions) -> Self {
        Self {
            options: Arc::new(options),
            browser: OnceCell::new(),
        }
    }

    async fn launch(&self) -> Result<LaunchedBrowser, BrowserError> {
        let path =
            find_chromium(self.options.chromium_path.as_ref()).ok_or(BrowserError::BinaryNotFound)?;
        info!(path = %path.display(), headless = self.options.headless, "Launching Chromium");

        let mut builder = CdpBrowserConfig::builder()
            .chrome_executable(path)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg(format!("--lang={}", self.options.locale));
        if !self.options.headless {
            builder = builder.with_head();
        }
        if let Some(proxy) = &self.options.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy.server));
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler event error");
                }
            }
            debug!("Browser handler finished");
        });

        Ok(LaunchedBrowser {
            browser: tokio::sync::Mutex::new(browser),
            handler: Mutex::new(Some(handler)),
        })
    }
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn new_session(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let launched = self.browser.get_or_try_init(|| self.launch()).await?;

        let page = launched
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Session(e.to_string()))?;
        let user_agent = SetUserAgentOverrideParams::builder()
            .user_agent(self.options.user_agent.clone())
            .accept_language(self.options.locale.clone())
            .build()
            .map_err(BrowserError::Session)?;
        page.set_user_agent(user_agent)
            .await
            .map_err(|e| BrowserError::Session(e.to_string()))?;

        let session = ChromiumSession::attach(page, Arc::clone(&self.options)).await?;
        debug!("Created Chromium session");
        Ok(Box::new(session))
    }

    async fn shutdown(&self) {
        let Some(launched) = self.browser.get() else {
            return;
        };

        {
            let mut browser = launched.browser.lock().await;
            if let Err(e) = browser.close().await {
                warn!(error = %e, "Failed to close Chromium");
            }
            if let Err(e) = browser.wait().await {
                debug!(error = %e, "Failed to reap Chromium process");
            }
        }

        let handler = launched
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handler) = handler {
            let abort = handler.abort_handle();
            if tokio::time::timeout(HANDLER_GRACE, handler).await.is_err() {
                warn!("Browser handler did not finish; aborting");
                abort.abort();
            }
        }
        info!("Chromium closed");
    }
}

// ============================================================================
// Chromium Session
// ============================================================================

/// First main-document response seen since the last reset.
#[derive(Debug, Clone, Copy)]
struct DocumentResponse {
    status: u16,
    at: Instant,
}

type DocumentSlot = Arc<Mutex<Option<DocumentResponse>>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavigationTiming {
    response_status: Option<u16>,
    response_start: Option<f64>,
}

/// A single Chromium page with its event listeners.
pub struct ChromiumSession {
    page: Page,
    document: DocumentSlot,
    listeners: Vec<JoinHandle<()>>,
}

fn is_heavy(resource: &ResourceType) -> bool {
    matches!(
        resource,
        ResourceType::Image | ResourceType::Media | ResourceType::Font
    )
}

fn session_error(e: &CdpError) -> BrowserError {
    BrowserError::Session(e.to_string())
}

impl ChromiumSession {
    async fn attach(page: Page, options: Arc<ChromiumOptions>) -> Result<Self, BrowserError> {
        let document: DocumentSlot = Arc::new(Mutex::new(None));
        let mut listeners = Vec::new();

        // The first document response after a reset is the main frame.
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| session_error(&e))?;
        let slot = Arc::clone(&document);
        listeners.push(tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                if event.r#type != ResourceType::Document {
                    continue;
                }
                let Ok(status) = u16::try_from(event.response.status) else {
                    continue;
                };
                let mut seen = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if seen.is_none() {
                    *seen = Some(DocumentResponse {
                        status,
                        at: Instant::now(),
                    });
                }
            }
        }));

        if options.needs_interception() {
            let credentials = options
                .proxy
                .as_ref()
                .filter(|p| p.has_credentials())
                .map(|p| (p.username.clone(), p.password.clone()));

            let mut paused = page
                .event_listener::<EventRequestPaused>()
                .await
                .map_err(|e| session_error(&e))?;
            let intercept_page = page.clone();
            let block_heavy = options.block_heavy_resources;
            listeners.push(tokio::spawn(async move {
                while let Some(event) = paused.next().await {
                    let outcome = if block_heavy && is_heavy(&event.resource_type) {
                        intercept_page
                            .execute(FailRequestParams::new(
                                event.request_id.clone(),
                                ErrorReason::BlockedByClient,
                            ))
                            .await
                            .map(|_| ())
                    } else {
                        intercept_page
                            .execute(ContinueRequestParams::new(event.request_id.clone()))
                            .await
                            .map(|_| ())
                    };
                    if let Err(e) = outcome {
                        debug!(error = %e, "Failed to resolve paused request");
                    }
                }
            }));

            if let Some((username, password)) = credentials.clone() {
                let mut challenges = page
                    .event_listener::<EventAuthRequired>()
                    .await
                    .map_err(|e| session_error(&e))?;
                let auth_page = page.clone();
                listeners.push(tokio::spawn(async move {
                    while let Some(event) = challenges.next().await {
                        let response = AuthChallengeResponse {
                            response: AuthChallengeResponseResponse::ProvideCredentials,
                            username: username.clone(),
                            password: password.clone(),
                        };
                        if let Err(e) = auth_page
                            .execute(ContinueWithAuthParams::new(
                                event.request_id.clone(),
                                response,
                            ))
                            .await
                        {
                            debug!(error = %e, "Failed to answer proxy auth challenge");
                        }
                    }
                }));
            }

            let enable = EnableParams::builder()
                .pattern(RequestPattern::builder().url_pattern("*").build())
                .handle_auth_requests(credentials.is_some())
                .build();
            page.execute(enable).await.map_err(|e| session_error(&e))?;
        }

        Ok(Self {
            page,
            document,
            listeners,
        })
    }

    async fn navigation_timing(&self) -> Option<NavigationTiming> {
        match self.page.evaluate(NAVIGATION_TIMING_JS).await {
            Ok(result) => result.into_value::<Option<NavigationTiming>>().ok().flatten(),
            Err(e) => {
                debug!(error = %e, "Navigation timing unavailable");
                None
            }
        }
    }
}

fn navigation_error(e: CdpError) -> BrowserError {
    match e {
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
            BrowserError::Crashed(e.to_string())
        }
        other => BrowserError::Navigation(other.to_string()),
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<PageLoad, BrowserError> {
        *self.document.lock().unwrap_or_else(PoisonError::into_inner) = None;
        let start = Instant::now();

        self.page.goto(url).await.map_err(navigation_error)?;
        let loaded = start.elapsed();
        self.page
            .wait_for_navigation()
            .await
            .map_err(navigation_error)?;
        let content = self.page.content().await.map_err(navigation_error)?;

        // The response listener runs on its own task; navigation timing
        // covers the case where its event has not landed yet.
        let seen = *self.document.lock().unwrap_or_else(PoisonError::into_inner);
        let (status, ttfb) = match seen {
            Some(response) => (Some(response.status), response.at.checked_duration_since(start)),
            None => {
                let timing = self.navigation_timing().await;
                let status = timing
                    .as_ref()
                    .and_then(|t| t.response_status)
                    .filter(|&s| s != 0);
                let ttfb = timing
                    .and_then(|t| t.response_start)
                    .filter(|ms| ms.is_finite() && *ms > 0.0)
                    .map(|ms| Duration::from_secs_f64(ms / 1000.0));
                (status, ttfb)
            }
        };

        Ok(PageLoad {
            status,
            ttfb: ttfb.or(Some(loaded)),
            content,
        })
    }

    async fn close(self: Box<Self>) {
        for listener in &self.listeners {
            listener.abort();
        }
        if let Err(e) = self.page.close().await {
            debug!(error = %e, "Failed to close page");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_path_wins() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        assert_eq!(find_chromium(Some(&path)), Some(path));
    }

    #[test]
    fn test_options_drop_proxy_when_disabled() {
        let proxy = ProxySettings::parse("http://u:p@127.0.0.1:3128").unwrap();
        let mut general = GeneralConfig::default();
        general.use_proxy = false;

        let options = ChromiumOptions::from_config(&general, &BrowserConfig::default(), Some(&proxy));
        assert!(options.proxy.is_none());
        assert!(options.needs_interception());

        let mut browser = BrowserConfig::default();
        browser.block_heavy_resources = false;
        let options = ChromiumOptions::from_config(&general, &browser, Some(&proxy));
        assert!(!options.needs_interception());
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_navigates_data_url() {
        let engine = ChromiumEngine::new(ChromiumOptions::from_config(
            &GeneralConfig::default(),
            &BrowserConfig::default(),
            None,
        ));
        let mut session = engine.new_session().await.expect("failed to create session");

        let page = session
            .navigate("data:text/html,<h1>Hello</h1><p>World</p>")
            .await
            .expect("navigation failed");
        assert!(page.content.contains("<h1>Hello</h1>"));
        assert!(page.ttfb.is_some());

        session.close().await;
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_before_launch_is_a_no_op() {
        let engine = ChromiumEngine::new(ChromiumOptions::from_config(
            &GeneralConfig::default(),
            &BrowserConfig::default(),
            None,
        ));
        engine.shutdown().await;
        assert!(engine.browser.get().is_none());
    }
}
