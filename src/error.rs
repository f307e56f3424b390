//! Error handling for the bridge

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration missing required fields or out of range
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upstream collaborator returned a non-success status
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Vision response carried no usable structured decision
    #[error("Parse error: {0}")]
    Parse(String),

    /// Bus (MQTT) error
    #[error("Bus error: {0}")]
    Bus(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors worth one retry against the same or a fallback target.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::Upstream(_) | Error::Bus(_) => true,
            _ => false,
        }
    }
}
