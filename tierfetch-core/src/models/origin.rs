//! URL origin normalization.

use url::Url;

/// Parses a URL, defaulting to `https` when no scheme is given.
pub fn parse_url(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let url = if trimmed.contains("://") {
        Url::parse(trimmed).ok()?
    } else {
        Url::parse(&format!("https://{trimmed}")).ok()?
    };

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Some(url),
        _ => None,
    }
}

/// Returns the origin (`scheme://host[:port]`) of a URL.
///
/// Default ports are omitted. Returns `None` for URLs that cannot be
/// fetched over HTTP.
pub fn origin_of(raw: &str) -> Option<String> {
    parse_url(raw).map(|url| url.origin().ascii_serialization())
}
