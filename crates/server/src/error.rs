//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers return `Result<T, AppError>`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::discord::DiscordError;
use crate::services::AccessError;

/// Application-level error type for the gate.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Discord API operation failed.
    #[error("Discord error: {0}")]
    Discord(#[from] DiscordError),

    /// Access resolution failed.
    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    /// No lock could be queried.
    #[error("Membership oracle unavailable")]
    OracleUnavailable,

    /// The OAuth join flow failed; the user is asked to contact the team.
    #[error("OAuth flow failed: {reason}")]
    OAuthFailed { server_name: String, reason: String },

    /// Caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal(_) | Self::OAuthFailed { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Discord(_) => StatusCode::BAD_GATEWAY,
            Self::Access(err) => match err {
                AccessError::NonceNotFound => StatusCode::NOT_FOUND,
                AccessError::AlreadyProcessed
                | AccessError::NonceUnbound
                | AccessError::MissingWallet => StatusCode::BAD_REQUEST,
                AccessError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
                AccessError::Gateway(_) => StatusCode::BAD_GATEWAY,
            },
            Self::OracleUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Discord(_) => "External service error".to_string(),
            Self::Access(err) => match err {
                AccessError::NonceNotFound => "Nonce not found.".to_string(),
                AccessError::AlreadyProcessed => "Nonce already used.".to_string(),
                AccessError::NonceUnbound => "Nonce is not linked to a Discord user.".to_string(),
                AccessError::MissingWallet => "Invalid state.".to_string(),
                AccessError::Repository(_) => "Internal server error".to_string(),
                AccessError::Gateway(_) => "External service error".to_string(),
            },
            Self::OracleUnavailable => {
                "Membership could not be checked right now, please try again later.".to_string()
            }
            Self::OAuthFailed { server_name, .. } => format!(
                "There was an error in accessing {server_name} Discord. Please contact one of the team members."
            ),
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a Discord user id.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}
