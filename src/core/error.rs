use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimingError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Metrics endpoint responded with HTTP {status}")]
    Status { status: u16 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid update notification: {0}")]
    InvalidNotification(String),

    #[error("Invalid completion payload: {0}")]
    InvalidCompletion(String),

    #[cfg(feature = "watch")]
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),
}
