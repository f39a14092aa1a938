//! Persisted robots cache.
//!
//! The file is a JSON object keyed by origin:
//!
//! ```json
//! {
//!   "https://example.com": {
//!     "allowed": true,
//!     "fetched_at": "2026-01-01T00:00:00Z",
//!     "ttl_expiry": "2026-01-02T00:00:00Z"
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use tierfetch_core::RobotsCacheEntry;

use crate::error::StoreError;
use crate::persistence::{load_json, save_json};

/// Handle to the robots cache file.
#[derive(Debug, Clone)]
pub struct RobotsFile {
    path: PathBuf,
}

impl RobotsFile {
    /// Creates a handle for the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads all entries, keyed by origin.
    ///
    /// A missing file is an empty cache. A corrupt file is logged and
    /// treated as empty so startup never fails on it.
    pub async fn load(&self) -> HashMap<String, RobotsCacheEntry> {
        match load_json::<HashMap<String, RobotsCacheEntry>>(&self.path).await {
            Ok(mut entries) => {
                for (origin, entry) in &mut entries {
                    entry.origin.clone_from(origin);
                }
                debug!(path = %self.path.display(), entries = entries.len(), "Loaded robots cache");
                entries
            }
            Err(e) if e.is_not_found() => {
                debug!(path = %self.path.display(), "No robots cache file yet");
                HashMap::new()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt robots cache, starting empty");
                HashMap::new()
            }
        }
    }

    /// Atomically replaces the file with the given entries.
    pub async fn save<'a, I>(&self, entries: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = &'a RobotsCacheEntry>,
    {
        let sorted: BTreeMap<&str, &RobotsCacheEntry> = entries
            .into_iter()
            .map(|e| (e.origin.as_str(), e))
            .collect();
        save_json(&self.path, &sorted).await
    }
}
