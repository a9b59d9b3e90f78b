//! Membership oracle: aggregates per-lock answers into one verdict.

use std::sync::Arc;

use lockgate_core::{LockDescriptor, WalletAddress};
use tracing::{error, instrument, warn};

use super::LockReader;
use super::error::ChainError;

/// Outcome of checking a wallet against every configured lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipCheck {
    /// A lock reported a positive balance.
    Member {
        /// The first lock (in configuration order) that said yes.
        lock: LockDescriptor,
    },
    /// No lock said yes and at least one answered cleanly.
    NotMember,
    /// Every lock query failed; nothing is known about the wallet.
    Unavailable {
        /// Number of failed lock queries.
        failures: usize,
    },
}

impl MembershipCheck {
    /// Boolean projection: only `Member` is true.
    #[must_use]
    pub const fn is_member(&self) -> bool {
        matches!(self, Self::Member { .. })
    }

    /// Whether the check failed for every lock.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Answers "does this wallet hold a qualifying key?".
///
/// Locks are evaluated in configuration order and the first positive answer
/// wins. A failing lock is logged and counted as "no"; only a check in which
/// every lock failed is reported as [`MembershipCheck::Unavailable`].
#[derive(Clone)]
pub struct MembershipOracle {
    reader: Arc<dyn LockReader>,
    locks: Arc<[LockDescriptor]>,
}

impl std::fmt::Debug for MembershipOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipOracle")
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

impl MembershipOracle {
    /// Create an oracle over `locks`.
    #[must_use]
    pub fn new(reader: Arc<dyn LockReader>, locks: Vec<LockDescriptor>) -> Self {
        Self {
            reader,
            locks: locks.into(),
        }
    }

    /// Configured locks, in evaluation order.
    #[must_use]
    pub fn locks(&self) -> &[LockDescriptor] {
        &self.locks
    }

    /// Check `wallet` against every lock.
    #[instrument(skip(self), fields(wallet = %wallet))]
    pub async fn check_membership(&self, wallet: &WalletAddress) -> MembershipCheck {
        let mut failures = 0;

        for lock in self.locks.iter() {
            match self.reader.balance_of(lock, wallet).await {
                Ok(balance) if !balance.is_zero() => {
                    return MembershipCheck::Member { lock: lock.clone() };
                }
                Ok(_) => {}
                Err(e) => {
                    failures += 1;
                    warn!(lock = %lock, error = %e, "Lock query failed");
                }
            }
        }

        if failures > 0 && failures == self.locks.len() {
            error!(failures, "All lock queries failed");
            return MembershipCheck::Unavailable { failures };
        }

        if failures > 0 {
            warn!(failures, "Wallet not a member, some locks could not be checked");
        }

        MembershipCheck::NotMember
    }

    /// Boolean projection of [`Self::check_membership`].
    pub async fn has_membership(&self, wallet: &WalletAddress) -> bool {
        self.check_membership(wallet).await.is_member()
    }

    /// Key validity on a single lock.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`ChainError`]; callers decide whether a failure
    /// counts as "no".
    pub async fn has_valid_key(
        &self,
        wallet: &WalletAddress,
        lock: &LockDescriptor,
    ) -> Result<bool, ChainError> {
        self.reader.has_valid_key(lock, wallet).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use alloy_primitives::U256;
    use async_trait::async_trait;

    use super::*;

    /// Per-lock canned answers keyed by lock name.
    struct ScriptedReader {
        answers: HashMap<String, Option<u64>>,
    }

    #[async_trait]
    impl LockReader for ScriptedReader {
        async fn balance_of(
            &self,
            lock: &LockDescriptor,
            _wallet: &WalletAddress,
        ) -> Result<U256, ChainError> {
            match self.answers.get(&lock.name).copied().flatten() {
                Some(balance) => Ok(U256::from(balance)),
                None => Err(ChainError::Timeout),
            }
        }

        async fn has_valid_key(
            &self,
            lock: &LockDescriptor,
            wallet: &WalletAddress,
        ) -> Result<bool, ChainError> {
            Ok(!self.balance_of(lock, wallet).await?.is_zero())
        }
    }

    fn oracle(answers: &[(&str, Option<u64>)]) -> MembershipOracle {
        let locks = answers
            .iter()
            .map(|(name, _)| {
                format!("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed:1:{name}")
                    .parse()
                    .unwrap()
            })
            .collect();
        let reader = ScriptedReader {
            answers: answers
                .iter()
                .map(|(name, a)| ((*name).to_string(), *a))
                .collect(),
        };
        MembershipOracle::new(Arc::new(reader), locks)
    }

    fn wallet() -> WalletAddress {
        WalletAddress::parse("0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359").unwrap()
    }

    #[tokio::test]
    async fn test_second_lock_positive() {
        let check = oracle(&[("a", Some(0)), ("b", Some(1))])
            .check_membership(&wallet())
            .await;
        assert!(matches!(check, MembershipCheck::Member { ref lock } if lock.name == "b"));
    }

    #[tokio::test]
    async fn test_failure_then_positive() {
        let oracle = oracle(&[("a", None), ("b", Some(2))]);
        assert!(oracle.has_membership(&wallet()).await);
    }

    #[tokio::test]
    async fn test_all_failed_is_unavailable() {
        let oracle = oracle(&[("a", None), ("b", None)]);
        let check = oracle.check_membership(&wallet()).await;
        assert_eq!(check, MembershipCheck::Unavailable { failures: 2 });
        assert!(!oracle.has_membership(&wallet()).await);
    }

    #[tokio::test]
    async fn test_partial_failure_is_not_member() {
        let check = oracle(&[("a", None), ("b", Some(0))])
            .check_membership(&wallet())
            .await;
        assert_eq!(check, MembershipCheck::NotMember);
    }

    #[tokio::test]
    async fn test_no_locks_is_not_member() {
        let check = oracle(&[]).check_membership(&wallet()).await;
        assert_eq!(check, MembershipCheck::NotMember);
    }
}
