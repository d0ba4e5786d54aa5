use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by {url} (retry after {retry_after_secs}s)")]
    RateLimited { url: String, retry_after_secs: u64 },

    #[error("endpoint not found: {url}")]
    NotFound { url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("parse failure at {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("payload decompression failed for {url}: {source}")]
    Decompress {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("build id could not be derived from {url}")]
    MissingBuildId { url: String },

    #[cfg(feature = "browser")]
    #[error("browser error: {0}")]
    Browser(String),

    #[error(transparent)]
    Db(#[from] realagg_db::DbError),
}

impl ScrapeError {
    /// Classify an HTTP status for retry purposes. 429 and 503 (and any
    /// other 5xx) are transient; everything else propagates immediately.
    #[must_use]
    pub fn from_status(status: u16, url: String, retry_after_secs: Option<u64>) -> Self {
        match status {
            429 => Self::RateLimited {
                url,
                retry_after_secs: retry_after_secs.unwrap_or(30),
            },
            404 => Self::NotFound { url },
            _ => Self::UnexpectedStatus { status, url },
        }
    }
}
