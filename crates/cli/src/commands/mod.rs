//! CLI subcommands.

pub mod migrate;
pub mod sweep;

use lockgate_server::config::ConfigError;
use lockgate_server::state::StateError;
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Clients could not be built.
    #[error("Setup error: {0}")]
    Setup(#[from] StateError),

    /// Report could not be rendered.
    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}
