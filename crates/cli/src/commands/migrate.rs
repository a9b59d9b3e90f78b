//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! lockgate-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `LOCKGATE_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string
//!
//! Migrations live in `crates/server/migrations/` and are embedded in the
//! server library.

use lockgate_server::db;
use secrecy::SecretString;

use super::CommandError;

/// Apply pending migrations.
///
/// Only the database URL is read, so migrations can run before the rest of
/// the environment is configured.
pub async fn run() -> Result<(), CommandError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("LOCKGATE_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| CommandError::MissingEnvVar("LOCKGATE_DATABASE_URL"))?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&SecretString::from(database_url)).await?;

    tracing::info!("Running migrations...");
    db::run_migrations(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
