//! Typed errors for the ingestion core.
//!
//! Storage and queue backends return `anyhow::Result` like the rest of the
//! kernel traits; their failures enter this enum through `Backend`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Source id has no configuration and the registry has no default rules
    #[error("invalid source: {0}")]
    InvalidSource(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Remote and fallback extraction both produced zero records
    #[error("no records found for source {source_id}")]
    NoRecordsFound { source_id: String },

    #[error("source {0} has no fetch URL configured")]
    MissingSourceUrl(String),

    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("remote extraction is not configured")]
    RemoteUnavailable,

    #[error("rate limit exceeded, try again later")]
    RateLimited,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
