// Error types and error handling module
// This file defines the error type shared by the key cache, the metrics
// backends and the settings loader
//
// Numan Thabit 2025 Nov

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metric already registered: {0}")]
    AlreadyRegistered(String),
    #[error("invalid metric name: {0}")]
    InvalidName(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("recording failed for {key}: {reason}")]
    Recording { key: String, reason: String },
}

impl From<prometheus::Error> for MetricsError {
    fn from(err: prometheus::Error) -> Self {
        let message = err.to_string();
        match err {
            prometheus::Error::AlreadyReg => MetricsError::AlreadyRegistered(message),
            _ => MetricsError::Backend(message),
        }
    }
}
