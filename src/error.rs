use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Review source error: {0}")]
    ReviewSource(String),

    #[error("App not found in review source: {0}")]
    AppNotFound(String),

    #[error("Rate limit exceeded, retry after {0} seconds")]
    RateLimited(u64),

    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("LLM API error: {0}")]
    LLMApi(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persisted state is unreadable: {0}")]
    CorruptState(String),

    #[error("Another run holds the lock for app {0}")]
    Locked(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RateLimited(_) | Error::TransientNetwork(_) | Error::Network(_)
        )
    }

    /// Errors after which a run can continue on previously stored data.
    pub fn is_recoverable(&self) -> bool {
        self.is_retryable() || matches!(self, Error::RetriesExhausted { .. })
    }
}
