//! Core types for Lockgate.
//!
//! This module provides type-safe wrappers for the domain concepts shared
//! between the access resolver, the sweeper, and the stores.

pub mod id;
pub mod lock;
pub mod nonce;
pub mod user;
pub mod wallet;

pub use alloy_primitives::Address;
pub use id::*;
pub use lock::{LockDescriptor, LockParseError};
pub use nonce::{Nonce, NonceId, NonceIdError};
pub use user::UserRecord;
pub use wallet::{WalletAddress, WalletAddressError};
