//! Business logic: access resolution and reconciliation.

pub mod access;
pub mod sweeper;

pub use access::{
    AccessError, AccessOutcome, AccessResolver, AccessSettings, OAuthStart, UnlockOutcome,
};
pub use sweeper::{ReconciliationSweeper, SweepReport};
