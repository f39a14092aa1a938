//! HTTP client with tracing, timeouts, and proxy routing.
//!
//! One client is built per pipeline and shared by the HTTP tier and the
//! robots source, so both go through the same connection pool and proxy.

use reqwest::{Client, Proxy, Response, header, header::HeaderMap, header::HeaderValue};
use std::time::Duration;
use tracing::{debug, instrument};

use tierfetch_core::{GeneralConfig, HttpConfig, ProxySettings, Route};

use crate::error::HttpError;

/// Maximum redirects followed per request.
const MAX_REDIRECTS: usize = 10;

/// Browser-like `Accept` header.
const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Browser-like `Accept-Language` header.
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

// ============================================================================
// HTTP Client
// ============================================================================

/// HTTP client wrapper with tracing and configured timeouts.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    total_timeout: Duration,
    route: Route,
}

impl HttpClient {
    /// Creates a client from the configuration.
    ///
    /// The proxy is used only when `general.use_proxy` is set.
    pub fn from_config(
        general: &GeneralConfig,
        http: &HttpConfig,
        proxy: Option<&ProxySettings>,
    ) -> Result<Self, HttpError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static(ACCEPT_LANGUAGE),
        );

        let mut builder = Client::builder()
            .user_agent(general.user_agent.as_str())
            .default_headers(headers)
            .timeout(http.total_timeout())
            .connect_timeout(http.connect_timeout())
            .read_timeout(http.read_timeout())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS));

        let proxy = proxy.filter(|_| general.use_proxy);
        match proxy {
            Some(proxy) => {
                debug!(server = %proxy.server, "Routing HTTP through proxy");
                let proxy = Proxy::all(proxy.to_url())
                    .map_err(|e| HttpError::Build(format!("invalid proxy: {e}")))?;
                builder = builder.proxy(proxy);
            }
            None => {
                builder = builder.no_proxy();
            }
        }

        let inner = builder
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;

        Ok(Self {
            inner,
            total_timeout: http.total_timeout(),
            route: Route::from_proxy(proxy.is_some()),
        })
    }

    /// Returns how requests from this client are routed.
    pub fn route(&self) -> Route {
        self.route
    }

    /// Returns the total per-request timeout.
    pub fn total_timeout(&self) -> Duration {
        self.total_timeout
    }

    /// Performs a GET request.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get(&self, url: &str) -> Result<Response, HttpError> {
        debug!("GET request");

        let response = self.inner.get(url).send().await?;
        debug!(status = %response.status(), "Response received");
        Ok(response)
    }

    /// Performs a GET request with a per-request timeout override.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_with_timeout(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<Response, HttpError> {
        debug!(timeout_ms = timeout.as_millis(), "GET request");

        let response = self.inner.get(url).timeout(timeout).send().await?;
        debug!(status = %response.status(), "Response received");
        Ok(response)
    }
}

// ============================================================================
// Tests
// ============================================================================
