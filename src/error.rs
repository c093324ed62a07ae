//! Error types for the insider radar

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the insider radar
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Upstream trade/market API errors
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Upstream API error {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    // On-chain RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("All RPC endpoints failed for {method}")]
    RpcExhausted { method: String },

    // Payload errors
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Upstream(_) | Error::UpstreamTimeout(_) | Error::Rpc(_) => true,
            // Rate limiting and server-side failures clear up on their own
            Error::UpstreamStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Check if this error came from the upstream trade/market sources.
    ///
    /// These are the only failures that abort an analysis run.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Error::Upstream(_) | Error::UpstreamStatus { .. } | Error::UpstreamTimeout(_)
        )
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::UpstreamTimeout(e.to_string())
        } else if e.is_decode() {
            Error::Deserialization(e.to_string())
        } else {
            Error::Upstream(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
