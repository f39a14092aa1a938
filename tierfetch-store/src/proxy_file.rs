//! Proxy descriptor file.

use std::path::Path;
use tracing::{debug, info};

use tierfetch_core::ProxySettings;

use crate::error::StoreError;

/// Loads proxy settings from the first non-empty line of a file.
///
/// Returns `Ok(None)` when the file is missing or blank. A malformed
/// descriptor is an error.
pub fn load_proxy_file(path: &Path) -> Result<Option<ProxySettings>, StoreError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No proxy file");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let Some(line) = content.lines().map(str::trim).find(|l| !l.is_empty()) else {
        debug!(path = %path.display(), "Proxy file is empty");
        return Ok(None);
    };

    let proxy = ProxySettings::parse(strip_quotes(line))?;
    info!(server = %proxy.server, authenticated = proxy.has_credentials(), "Loaded proxy");
    Ok(Some(proxy))
}

fn strip_quotes(line: &str) -> &str {
    line.trim_matches(|c| c == '"' || c == '\'').trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_non_empty_line_with_quotes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy.txt");
        std::fs::write(&path, "\n  \n\"http://u:p@proxy.test:8080\"\nignored\n").unwrap();

        let proxy = load_proxy_file(&path).unwrap().unwrap();
        assert_eq!(proxy.server, "http://proxy.test:8080");
        assert_eq!(proxy.to_url(), "http://u:p@proxy.test:8080");
    }

    #[test]
    fn test_missing_or_blank_means_no_proxy() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_proxy_file(&dir.path().join("none")).unwrap().is_none());

        let blank = dir.path().join("blank");
        std::fs::write(&blank, "\n\n").unwrap();
        assert!(load_proxy_file(&blank).unwrap().is_none());
    }

    #[test]
    fn test_malformed_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy.txt");
        std::fs::write(&path, "not a proxy").unwrap();

        let err = load_proxy_file(&path).unwrap_err();
        assert!(matches!(err, StoreError::Core(_)));
    }
}
