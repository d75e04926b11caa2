//! Error types for bodytap

use thiserror::Error;

/// Errors surfaced by the recording side of the pipeline.
///
/// None of these ever reach the producer writing a body: forwarded sink
/// calls return the wrapped sink's own `std::io::Result`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Collector error: {0}")]
    Collector(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a collector error
    pub fn collector(message: impl Into<String>) -> Self {
        Self::Collector(message.into())
    }
}

/// Result type alias for bodytap operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
