use thiserror::Error;

#[derive(Debug, Error)]
pub enum FirecrawlError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Firecrawl API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Scrape was not successful: {0}")]
    Unsuccessful(String),

    #[error("Response contained no structured data for {0}")]
    MissingData(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FirecrawlError>;
