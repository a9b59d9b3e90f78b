//! In-memory stores.
//!
//! Used by tests and by local runs without a database. `DashMap` gives the
//! per-key atomicity the store contracts require: a nonce claim happens under
//! the shard write lock of that key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use lockgate_core::{Nonce, NonceId, UserId, UserRecord, WalletAddress};

use super::{ClaimOutcome, NonceStore, RepositoryError, UserWalletStore};

/// Nonce store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryNonceStore {
    nonces: DashMap<NonceId, Nonce>,
}

impl InMemoryNonceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nonces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nonces.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nonces.is_empty()
    }
}

#[async_trait]
impl NonceStore for InMemoryNonceStore {
    async fn insert(&self, nonce: &Nonce) -> Result<(), RepositoryError> {
        match self.nonces.entry(nonce.id.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict(
                "nonce id already exists".to_owned(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(nonce.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: &NonceId) -> Result<Option<Nonce>, RepositoryError> {
        Ok(self.nonces.get(id).map(|n| n.value().clone()))
    }

    async fn bind_owner(&self, id: &NonceId, owner: UserId) -> Result<bool, RepositoryError> {
        Ok(self
            .nonces
            .get_mut(id)
            .map(|mut n| n.owner_user_id = Some(owner))
            .is_some())
    }

    async fn mark_processed(&self, id: &NonceId) -> Result<ClaimOutcome, RepositoryError> {
        let Some(mut nonce) = self.nonces.get_mut(id) else {
            return Ok(ClaimOutcome::NotFound);
        };

        if nonce.processed {
            return Ok(ClaimOutcome::AlreadyProcessed);
        }

        nonce.processed = true;
        Ok(ClaimOutcome::Claimed)
    }

    async fn delete(&self, id: &NonceId) -> Result<(), RepositoryError> {
        self.nonces.remove(id);
        Ok(())
    }

    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let before = self.nonces.len();
        self.nonces.retain(|_, n| n.created_at >= cutoff);
        Ok(u64::try_from(before.saturating_sub(self.nonces.len())).unwrap_or(u64::MAX))
    }
}

/// User wallet store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryUserWalletStore {
    users: DashMap<UserId, UserRecord>,
}

impl InMemoryUserWalletStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserWalletStore for InMemoryUserWalletStore {
    async fn add_wallet(
        &self,
        user: UserId,
        wallet: WalletAddress,
    ) -> Result<bool, RepositoryError> {
        Ok(self
            .users
            .entry(user)
            .or_insert_with(|| UserRecord::new(user))
            .add_wallet(wallet))
    }

    async fn get(&self, user: UserId) -> Result<Option<UserRecord>, RepositoryError> {
        Ok(self.users.get(&user).map(|r| r.value().clone()))
    }

    async fn list(&self) -> Result<Vec<UserRecord>, RepositoryError> {
        let mut records: Vec<UserRecord> =
            self.users.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.user_id);
        Ok(records)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn wallet() -> WalletAddress {
        WalletAddress::parse("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryNonceStore::new();
        let id = store.create(Some(UserId::new(7))).await.unwrap();

        let nonce = store.get(&id).await.unwrap().unwrap();
        assert_eq!(nonce.owner_user_id, Some(UserId::new(7)));
        assert!(!nonce.processed);
        assert!(nonce.wallet_address.is_none());
    }

    #[tokio::test]
    async fn test_mark_processed_once() {
        let store = InMemoryNonceStore::new();
        let id = store.create(None).await.unwrap();

        assert_eq!(store.mark_processed(&id).await.unwrap(), ClaimOutcome::Claimed);
        assert_eq!(
            store.mark_processed(&id).await.unwrap(),
            ClaimOutcome::AlreadyProcessed
        );

        let unknown = NonceId::generate();
        assert_eq!(
            store.mark_processed(&unknown).await.unwrap(),
            ClaimOutcome::NotFound
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_have_one_winner() {
        let store = Arc::new(InMemoryNonceStore::new());
        let id = store.create(Some(UserId::new(1))).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = id.clone();
                tokio::spawn(async move { store.mark_processed(&id).await.unwrap() })
            })
            .collect();

        let mut claimed = 0;
        for handle in handles {
            if handle.await.unwrap() == ClaimOutcome::Claimed {
                claimed += 1;
            }
        }
        assert_eq!(claimed, 1);
    }

    #[tokio::test]
    async fn test_bind_owner() {
        let store = InMemoryNonceStore::new();
        let id = store.create(None).await.unwrap();

        assert!(store.bind_owner(&id, UserId::new(9)).await.unwrap());
        assert_eq!(
            store.get(&id).await.unwrap().unwrap().owner_user_id,
            Some(UserId::new(9))
        );
        assert!(!store.bind_owner(&NonceId::generate(), UserId::new(9)).await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_duplicate_is_conflict() {
        let store = InMemoryNonceStore::new();
        let nonce = Nonce::issue(None, None);
        store.insert(&nonce).await.unwrap();
        assert!(matches!(
            store.insert(&nonce).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_purge_created_before() {
        let store = InMemoryNonceStore::new();
        let mut old = Nonce::issue(None, None);
        old.created_at = Utc::now() - chrono::Duration::days(2);
        store.insert(&old).await.unwrap();
        let fresh = store.create(None).await.unwrap();

        let purged = store
            .purge_created_before(Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap();

        assert_eq!(purged, 1);
        assert!(store.get(&old.id).await.unwrap().is_none());
        assert!(store.get(&fresh).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_add_wallet_twice_keeps_one() {
        let store = InMemoryUserWalletStore::new();
        let user = UserId::new(42);

        assert!(store.add_wallet(user, wallet()).await.unwrap());
        assert!(!store.add_wallet(user, wallet()).await.unwrap());

        let record = store.get(user).await.unwrap().unwrap();
        assert_eq!(record.wallet_addresses.len(), 1);
    }

    #[tokio::test]
    async fn test_list_is_ordered() {
        let store = InMemoryUserWalletStore::new();
        store.add_wallet(UserId::new(3), wallet()).await.unwrap();
        store.add_wallet(UserId::new(1), wallet()).await.unwrap();

        let ids: Vec<_> = store.list().await.unwrap().iter().map(|r| r.user_id).collect();
        assert_eq!(ids, vec![UserId::new(1), UserId::new(3)]);
    }
}
