//! Error types for the dredgewatch service

/// Errors that can occur in the dredgewatch service
#[derive(Debug, thiserror::Error)]
pub enum DredgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to create connection: {0}")]
    Construction(String),

    #[error("API error: {0}")]
    Api(String),
}

/// Result type alias for dredgewatch operations
pub type Result<T> = std::result::Result<T, DredgeError>;

/// Errors surfaced to the consumer of a channel through its last-error field
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Connection error occurred: {0}")]
    Transport(String),

    #[error("Connection closed by server")]
    ClosedByServer,

    #[error("Failed to parse server message: {0}")]
    Parse(String),

    #[error("Failed to reconnect after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Failed to create connection: {0}")]
    Construction(String),
}

impl ChannelError {
    /// Whether the channel gave up and needs an explicit reconnect
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChannelError::RetriesExhausted { .. } | ChannelError::Construction(_)
        )
    }
}
