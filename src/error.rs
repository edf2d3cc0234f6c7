//! WolfCave Error Types

use thiserror::Error;

use crate::store::SeqNo;

/// Result type alias for WolfCave operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfCave error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to render configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("vbucket counts must match: {src} source vs {dst} destination")]
    VbucketCountMismatch { src: usize, dst: usize },

    // Store errors
    #[error("vbucket not found: {0}")]
    VbucketNotFound(u16),

    #[error("replica not found: {0}")]
    ReplicaNotFound(usize),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("invalid sequence range: ({after}, {up_to}]")]
    SeqNoOutOfRange { after: SeqNo, up_to: SeqNo },

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    // Virtual time errors
    #[error("Clock error: {0}")]
    Clock(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error was caused by invalid configuration
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::ConfigParse(_)
                | Error::VbucketCountMismatch { .. }
        )
    }

    /// Check if this error is retryable.
    ///
    /// Fetch anomalies heal on the next replication pass since no cursor
    /// was advanced.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::FetchFailed(_) | Error::SeqNoOutOfRange { .. }
        )
    }
}
