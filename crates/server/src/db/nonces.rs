//! `PostgreSQL` nonce store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lockgate_core::{Nonce, NonceId, UserId, WalletAddress};
use sqlx::PgPool;

use super::{ClaimOutcome, NonceStore, RepositoryError};

#[derive(sqlx::FromRow)]
struct NonceRow {
    id: String,
    owner_user_id: Option<UserId>,
    wallet_address: Option<WalletAddress>,
    processed: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NonceRow> for Nonce {
    type Error = RepositoryError;

    fn try_from(row: NonceRow) -> Result<Self, Self::Error> {
        let id = NonceId::parse(&row.id).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid nonce id in database: {e}"))
        })?;

        Ok(Self {
            id,
            owner_user_id: row.owner_user_id,
            wallet_address: row.wallet_address,
            processed: row.processed,
            created_at: row.created_at,
        })
    }
}

/// Nonce store backed by the `nonces` table.
#[derive(Clone)]
pub struct PgNonceStore {
    pool: PgPool,
}

impl PgNonceStore {
    /// Create a new nonce store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NonceStore for PgNonceStore {
    async fn insert(&self, nonce: &Nonce) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO nonces (id, owner_user_id, wallet_address, processed, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(nonce.id.as_str())
        .bind(nonce.owner_user_id)
        .bind(nonce.wallet_address)
        .bind(nonce.processed)
        .bind(nonce.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict("nonce id already exists".to_owned());
            }
            RepositoryError::Database(e)
        })?;

        Ok(())
    }

    async fn get(&self, id: &NonceId) -> Result<Option<Nonce>, RepositoryError> {
        let row = sqlx::query_as::<_, NonceRow>(
            r"
            SELECT id, owner_user_id, wallet_address, processed, created_at
            FROM nonces
            WHERE id = $1
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Nonce::try_from).transpose()
    }

    async fn bind_owner(&self, id: &NonceId, owner: UserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE nonces SET owner_user_id = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(owner)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_processed(&self, id: &NonceId) -> Result<ClaimOutcome, RepositoryError> {
        // The row lock taken by UPDATE serializes concurrent claims; only the
        // first one still sees processed = FALSE.
        let result =
            sqlx::query("UPDATE nonces SET processed = TRUE WHERE id = $1 AND processed = FALSE")
                .bind(id.as_str())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 1 {
            return Ok(ClaimOutcome::Claimed);
        }

        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM nonces WHERE id = $1)")
            .bind(id.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(if exists {
            ClaimOutcome::AlreadyProcessed
        } else {
            ClaimOutcome::NotFound
        })
    }

    async fn delete(&self, id: &NonceId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM nonces WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM nonces WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
