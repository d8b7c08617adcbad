//! Fatal errors of a conversion run.
//!
//! Anything in [`ConvertError`] aborts the run without a document. Per-file
//! problems are not errors: they are recorded as [`crate::contract::SkipReason`]
//! in the report and rendering continues.

/// Fatal outcome of a conversion run (or of a single provider call, which the
/// orchestrator may downgrade to a per-file skip).
#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    #[error("invalid repository URL: {0}")]
    InvalidUrl(String),

    #[error("invalid filter pattern #{position} `{pattern}`: {message}")]
    InvalidPattern {
        pattern: String,
        position: usize,
        message: String,
    },

    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("authentication required: {0}")]
    AuthRequired(String),

    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("tree conflict: `{0}` is used both as a file and as a directory")]
    TreeConflict(String),

    #[error("conversion cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected HTTP status {status} from {url}")]
    Upstream { status: u16, url: String },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    /// Cancellation is reported separately from genuine failures.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConvertError::Cancelled)
    }
}
