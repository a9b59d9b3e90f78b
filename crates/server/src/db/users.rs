//! `PostgreSQL` user wallet store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use lockgate_core::{UserId, UserRecord, WalletAddress};
use sqlx::PgPool;

use super::{RepositoryError, UserWalletStore};

/// User wallet store backed by the `users` and `user_wallets` tables.
#[derive(Clone)]
pub struct PgUserWalletStore {
    pool: PgPool,
}

impl PgUserWalletStore {
    /// Create a new user wallet store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Fold `(user, wallet)` rows into records, keeping users without wallets.
fn fold_rows(rows: Vec<(UserId, Option<WalletAddress>)>) -> Vec<UserRecord> {
    let mut records: BTreeMap<UserId, UserRecord> = BTreeMap::new();
    for (user_id, wallet) in rows {
        let record = records
            .entry(user_id)
            .or_insert_with(|| UserRecord::new(user_id));
        if let Some(wallet) = wallet {
            record.add_wallet(wallet);
        }
    }
    records.into_values().collect()
}

#[async_trait]
impl UserWalletStore for PgUserWalletStore {
    async fn add_wallet(
        &self,
        user: UserId,
        wallet: WalletAddress,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO users (user_id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(user)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            r"
            INSERT INTO user_wallets (user_id, wallet_address)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(user)
        .bind(wallet)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, user: UserId) -> Result<Option<UserRecord>, RepositoryError> {
        let rows = sqlx::query_as::<_, (UserId, Option<WalletAddress>)>(
            r"
            SELECT u.user_id, w.wallet_address
            FROM users u
            LEFT JOIN user_wallets w ON w.user_id = u.user_id
            WHERE u.user_id = $1
            ",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;

        Ok(fold_rows(rows).into_iter().next())
    }

    async fn list(&self) -> Result<Vec<UserRecord>, RepositoryError> {
        let rows = sqlx::query_as::<_, (UserId, Option<WalletAddress>)>(
            r"
            SELECT u.user_id, w.wallet_address
            FROM users u
            LEFT JOIN user_wallets w ON w.user_id = u.user_id
            ORDER BY u.user_id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(fold_rows(rows))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_rows_groups_by_user() {
        let a = WalletAddress::parse("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").unwrap();
        let b = WalletAddress::parse("0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359").unwrap();
        let rows = vec![
            (UserId::new(2), Some(a)),
            (UserId::new(1), None),
            (UserId::new(2), Some(b)),
            (UserId::new(2), Some(a)),
        ];

        let records = fold_rows(rows);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].user_id, UserId::new(1));
        assert!(!records[0].has_wallets());
        assert_eq!(records[1].wallet_addresses.len(), 2);
    }
}
