//! Error types for the assistant core.

use thiserror::Error;

/// Result type alias for assistant operations.
pub type AssistantResult<T> = Result<T, AssistantError>;

/// Errors that can occur inside the assistant core.
///
/// None of these cross the session boundary: the session manager turns
/// them into log entries or transcript notices.
#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Live channel is not open")]
    ChannelNotOpen,

    #[error("Live channel closed unexpectedly: {0}")]
    ChannelClosedUnexpectedly(String),

    #[error("Failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Session has been unmounted")]
    SessionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
