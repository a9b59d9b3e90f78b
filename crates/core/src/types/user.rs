//! User records: which wallets a Discord user has proven ownership of.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::id::UserId;
use super::wallet::WalletAddress;

/// Append-only identity record for one Discord user.
///
/// Wallets are a set: adding an address that is already present is a no-op.
/// Records are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Discord user id.
    pub user_id: UserId,
    /// Wallets proven via signature, in address order.
    pub wallet_addresses: BTreeSet<WalletAddress>,
}

impl UserRecord {
    /// Create an empty record.
    #[must_use]
    pub const fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            wallet_addresses: BTreeSet::new(),
        }
    }

    /// Add a wallet. Returns `true` if it was not already present.
    pub fn add_wallet(&mut self, wallet: WalletAddress) -> bool {
        self.wallet_addresses.insert(wallet)
    }

    /// Whether the user has any wallet on file.
    #[must_use]
    pub fn has_wallets(&self) -> bool {
        !self.wallet_addresses.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_add_wallet_is_idempotent() {
        let wallet = WalletAddress::parse("0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359").unwrap();
        let mut record = UserRecord::new(UserId::new(7));
        assert!(!record.has_wallets());

        assert!(record.add_wallet(wallet));
        assert!(!record.add_wallet(wallet));
        assert_eq!(record.wallet_addresses.len(), 1);
    }
}
