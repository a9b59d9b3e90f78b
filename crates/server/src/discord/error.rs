//! Discord-related errors.

use thiserror::Error;

/// Errors that can occur when interacting with Discord.
#[derive(Debug, Error)]
pub enum DiscordError {
    /// HTTP request failed.
    #[error("Discord request failed: {0}")]
    Request(String),

    /// Failed to parse response.
    #[error("Discord response error: {0}")]
    Response(String),

    /// Discord API returned a non-success status.
    #[error("Discord API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from Discord.
        message: String,
    },

    /// A referenced guild object does not exist.
    #[error("Discord object not found: {0}")]
    NotFound(String),

    /// Invalid interaction signature.
    #[error("Invalid Discord signature: {0}")]
    InvalidSignature(String),

    /// Configuration error.
    #[error("Discord configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for DiscordError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.to_string())
    }
}
