//! Defaults and user-facing options of a conversion run.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Files larger than this are skipped unless the caller says otherwise (1 MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1_000_000;

/// Concurrent `fetch_content` calls per run. Kept in single digits so
/// anonymous callers stay inside host rate limits.
pub const FETCH_CONCURRENCY: usize = 8;

/// User-facing knobs of one conversion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertOptions {
    /// Comma-separated regex patterns; empty keeps every file.
    #[serde(default)]
    pub filter: String,
    /// Per-file size limit in bytes; zero disables it.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            filter: String::new(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl ConvertOptions {
    pub fn trace_loaded(&self) {
        info!(
            filter = %self.filter,
            max_file_size = self.max_file_size,
            "Loaded ConvertOptions"
        );
        debug!(?self, "ConvertOptions loaded (full debug)");
    }
}
