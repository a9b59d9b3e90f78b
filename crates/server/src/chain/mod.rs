//! On-chain membership.
//!
//! This module provides:
//! - [`LockReader`], the seam to the chain (JSON-RPC in production)
//! - [`MembershipOracle`] for aggregating answers across locks
//! - [`SignatureVerifier`] for recovering wallets from signed challenges

mod error;
mod oracle;
mod rpc;
mod signature;

use alloy_primitives::U256;
use async_trait::async_trait;
use lockgate_core::{LockDescriptor, WalletAddress};

pub use error::{ChainError, SignatureError};
pub use oracle::{MembershipCheck, MembershipOracle};
pub use rpc::JsonRpcLockReader;
pub use signature::SignatureVerifier;

/// Read-only access to lock contracts.
#[async_trait]
pub trait LockReader: Send + Sync {
    /// Number of keys `wallet` holds on `lock`.
    async fn balance_of(
        &self,
        lock: &LockDescriptor,
        wallet: &WalletAddress,
    ) -> Result<U256, ChainError>;

    /// Whether `wallet` holds an unexpired key on `lock`.
    async fn has_valid_key(
        &self,
        lock: &LockDescriptor,
        wallet: &WalletAddress,
    ) -> Result<bool, ChainError>;
}
