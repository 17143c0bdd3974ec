use menuscout_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("endpoint not found: {url}")]
    NotFound { url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("extraction failed for {target}: {reason}")]
    Extraction { target: String, reason: String },

    #[error("no scope '{scope}' is registered with this sink")]
    UnknownScope { scope: String },

    #[error("persistence failed: {0}")]
    Persistence(#[from] DbError),

    #[error("cancelled")]
    Cancelled,

    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl ScraperError {
    /// True when persistence refused the call because a breaker is open.
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ScraperError::Persistence(e) if e.is_circuit_open())
    }
}
