//! Durable state: nonces and user wallet records.
//!
//! # Database: `lockgate`
//!
//! ## Tables
//!
//! - `nonces` - Single-use checkout / OAuth state tokens
//! - `users` - Discord users that proved ownership of at least one wallet
//! - `user_wallets` - Wallet set per user (append-only)
//!
//! The access resolver and the sweeper only see the [`NonceStore`] and
//! [`UserWalletStore`] traits. [`PgNonceStore`]/[`PgUserWalletStore`] back
//! them in production, the in-memory variants back tests.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p lockgate-cli -- migrate
//! ```

mod memory;
mod nonces;
mod users;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lockgate_core::{Nonce, NonceId, UserId, UserRecord, WalletAddress};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use memory::{InMemoryNonceStore, InMemoryUserWalletStore};
pub use nonces::PgNonceStore;
pub use users::PgUserWalletStore;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Constraint violation (e.g., duplicate nonce id).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Result of trying to claim a nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller flipped `processed` from false to true.
    Claimed,
    /// Someone else already claimed it.
    AlreadyProcessed,
    /// No such nonce.
    NotFound,
}

/// Nonce persistence.
///
/// `mark_processed` must be linearizable per id: of any number of concurrent
/// calls for the same unprocessed nonce, exactly one returns
/// [`ClaimOutcome::Claimed`].
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Persist a freshly issued nonce.
    async fn insert(&self, nonce: &Nonce) -> Result<(), RepositoryError>;

    /// Look up a nonce.
    async fn get(&self, id: &NonceId) -> Result<Option<Nonce>, RepositoryError>;

    /// Set the owning user. Returns `false` if the nonce does not exist.
    async fn bind_owner(&self, id: &NonceId, owner: UserId) -> Result<bool, RepositoryError>;

    /// Atomically transition `processed` from false to true.
    async fn mark_processed(&self, id: &NonceId) -> Result<ClaimOutcome, RepositoryError>;

    /// Remove a nonce after terminal use. Missing ids are ignored.
    async fn delete(&self, id: &NonceId) -> Result<(), RepositoryError>;

    /// Remove every nonce created before `cutoff`, returning how many.
    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;

    /// Issue and persist a new nonce for `owner`.
    async fn create(&self, owner: Option<UserId>) -> Result<NonceId, RepositoryError> {
        let nonce = Nonce::issue(owner, None);
        self.insert(&nonce).await?;
        Ok(nonce.id)
    }

    /// Issue and persist a nonce carrying an already verified wallet.
    async fn create_with_wallet(
        &self,
        owner: Option<UserId>,
        wallet: WalletAddress,
    ) -> Result<NonceId, RepositoryError> {
        let nonce = Nonce::issue(owner, Some(wallet));
        self.insert(&nonce).await?;
        Ok(nonce.id)
    }
}

/// User wallet persistence.
#[async_trait]
pub trait UserWalletStore: Send + Sync {
    /// Add `wallet` to the user's set, creating the record if needed.
    /// Returns `true` if the wallet was not on file yet.
    async fn add_wallet(&self, user: UserId, wallet: WalletAddress)
    -> Result<bool, RepositoryError>;

    /// Look up one user.
    async fn get(&self, user: UserId) -> Result<Option<UserRecord>, RepositoryError>;

    /// Every known user, ordered by user id.
    async fn list(&self) -> Result<Vec<UserRecord>, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Apply the embedded migrations.
///
/// # Errors
///
/// Returns an error if a migration fails to apply.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
