//! Fetch tiers.
//!
//! - [`http`] - Retrying stateless HTTP fetches under an admission gate
//! - [`browser`] - Pooled browser fetches with an escalation budget
//!
//! Both tiers classify their outcome the same way and produce the same
//! [`FetchResult`] shape. [`Fetcher`] is the closed set of tiers.

pub mod browser;
pub mod http;

pub use browser::{BrowserFetcher, EscalationBudget, PooledSession, SessionPool};
pub use http::HttpFetcher;

use tierfetch_core::{FailureKind, FetchResult, Tier};

/// One of the two fetch tiers.
pub enum Fetcher {
    /// The HTTP tier.
    Http(HttpFetcher),
    /// The browser tier.
    Browser(BrowserFetcher),
}

impl Fetcher {
    /// Returns the tier this fetcher implements.
    pub fn tier(&self) -> Tier {
        match self {
            Self::Http(_) => Tier::Http,
            Self::Browser(_) => Tier::Browser,
        }
    }

    /// Fetches one URL. Never fails; the outcome is classified on the result.
    pub async fn fetch(&self, url: &str) -> FetchResult {
        match self {
            Self::Http(fetcher) => fetcher.fetch(url).await,
            Self::Browser(fetcher) => fetcher.fetch(url).await,
        }
    }

    /// Releases the tier's resources. Fetches after this fail.
    pub async fn shutdown(&self) {
        match self {
            Self::Http(fetcher) => fetcher.close(),
            Self::Browser(fetcher) => fetcher.pool().shutdown().await,
        }
    }
}

impl From<HttpFetcher> for Fetcher {
    fn from(fetcher: HttpFetcher) -> Self {
        Self::Http(fetcher)
    }
}

impl From<BrowserFetcher> for Fetcher {
    fn from(fetcher: BrowserFetcher) -> Self {
        Self::Browser(fetcher)
    }
}

/// Classifies a received response.
///
/// A captcha wins over any status code.
pub fn classify_response(status: u16, is_captcha: bool) -> FailureKind {
    if is_captcha {
        FailureKind::Captcha
    } else if status >= 400 {
        FailureKind::HttpError
    } else {
        FailureKind::None
    }
}

/// Converts a duration to whole milliseconds.
pub(crate) fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
