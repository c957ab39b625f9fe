use thiserror::Error;

#[derive(Debug, Error)]
pub enum FluxError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Content moderated: {0}")]
    Moderated(String),
    #[error("Generation timed out after {0} polling attempts")]
    Timeout(u32),
    #[error("History store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("History entry not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FluxError {
    /// Whether repeating the same request could plausibly succeed.
    ///
    /// Polling timeouts are excluded; a retry would start a second paid
    /// generation while the first may still finish.
    pub fn is_transient(&self) -> bool {
        matches!(self, FluxError::Network(_))
    }
}

impl From<serde_json::Error> for FluxError {
    fn from(e: serde_json::Error) -> Self {
        FluxError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FluxError>;
