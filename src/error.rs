use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("queue full")]
    QueueFull,
    #[error("cache closed")]
    Closed,
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("failed to spawn ingest thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True when retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::QueueFull)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
