//! Reconciliation sweep.
//!
//! Periodically re-validates every known wallet and converges Discord role
//! state to on-chain truth: role held if and only if some wallet of the user
//! currently holds a valid key.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use lockgate_core::{RoleId, UserRecord};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::chain::MembershipOracle;
use crate::db::{NonceStore, UserWalletStore};
use crate::discord::RoleGateway;

/// Counters for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Users examined.
    pub checked: usize,
    /// Roles granted.
    pub granted: usize,
    /// Roles revoked.
    pub revoked: usize,
    /// Users already in the right state.
    pub unchanged: usize,
    /// Users skipped (left the guild, or every chain query failed).
    pub skipped: usize,
    /// Users whose Discord lookup or mutation failed.
    pub failed: usize,
    /// Expired nonces removed.
    pub purged: u64,
}

/// What the chain says about one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Eligibility {
    Eligible,
    NotEligible,
    Unknown,
}

/// What happened to one user.
enum MemberAction {
    Granted,
    Revoked,
    Unchanged,
    Skipped,
}

/// Scheduled reconciler.
#[derive(Clone)]
pub struct ReconciliationSweeper {
    users: Arc<dyn UserWalletStore>,
    nonces: Arc<dyn NonceStore>,
    oracle: MembershipOracle,
    gateway: Arc<dyn RoleGateway>,
    role_id: RoleId,
    nonce_ttl: TimeDelta,
}

impl ReconciliationSweeper {
    /// Create a sweeper.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserWalletStore>,
        nonces: Arc<dyn NonceStore>,
        oracle: MembershipOracle,
        gateway: Arc<dyn RoleGateway>,
        role_id: RoleId,
        nonce_ttl: TimeDelta,
    ) -> Self {
        Self {
            users,
            nonces,
            oracle,
            gateway,
            role_id,
            nonce_ttl,
        }
    }

    /// Run the sweep every `period`, starting one period from now.
    #[must_use]
    pub fn spawn(self, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }

    /// Reconcile every known user once.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        match self.users.list().await {
            Ok(records) => {
                for record in &records {
                    report.checked += 1;
                    match self.reconcile(record).await {
                        Ok(MemberAction::Granted) => report.granted += 1,
                        Ok(MemberAction::Revoked) => report.revoked += 1,
                        Ok(MemberAction::Unchanged) => report.unchanged += 1,
                        Ok(MemberAction::Skipped) => report.skipped += 1,
                        Err(e) => {
                            report.failed += 1;
                            warn!(user = %record.user_id, error = %e, "Failed to reconcile member");
                        }
                    }
                }
            }
            Err(e) => error!(error = %e, "Failed to list users, skipping reconciliation"),
        }

        match Utc::now().checked_sub_signed(self.nonce_ttl) {
            Some(cutoff) => match self.nonces.purge_created_before(cutoff).await {
                Ok(purged) => report.purged = purged,
                Err(e) => warn!(error = %e, "Failed to purge expired nonces"),
            },
            None => debug!("Nonce TTL reaches past the earliest timestamp, nothing to purge"),
        }

        info!(
            checked = report.checked,
            granted = report.granted,
            revoked = report.revoked,
            unchanged = report.unchanged,
            skipped = report.skipped,
            failed = report.failed,
            purged = report.purged,
            "Sweep finished"
        );

        report
    }

    async fn reconcile(
        &self,
        record: &UserRecord,
    ) -> Result<MemberAction, crate::discord::DiscordError> {
        let user = record.user_id;

        let Some(member) = self.gateway.fetch_member(user).await? else {
            debug!(user = %user, "Not in guild");
            return Ok(MemberAction::Skipped);
        };

        let has_role = member.has_role(self.role_id);

        match (self.eligibility(record).await, has_role) {
            (Eligibility::Unknown, _) => {
                warn!(user = %user, "Every chain query failed, leaving role untouched");
                Ok(MemberAction::Skipped)
            }
            (Eligibility::Eligible, false) => {
                self.gateway.add_role(user, self.role_id).await?;
                info!(user = %user, "Role granted by sweep");
                Ok(MemberAction::Granted)
            }
            (Eligibility::NotEligible, true) => {
                self.gateway.remove_role(user, self.role_id).await?;
                info!(user = %user, "Role revoked by sweep");
                Ok(MemberAction::Revoked)
            }
            _ => Ok(MemberAction::Unchanged),
        }
    }

    /// Ask every lock about every wallet, stopping at the first valid key.
    async fn eligibility(&self, record: &UserRecord) -> Eligibility {
        let mut answered = record.wallet_addresses.is_empty();

        for wallet in &record.wallet_addresses {
            for lock in self.oracle.locks() {
                match self.oracle.has_valid_key(wallet, lock).await {
                    Ok(true) => return Eligibility::Eligible,
                    Ok(false) => answered = true,
                    Err(e) => {
                        warn!(user = %record.user_id, wallet = %wallet, lock = %lock, error = %e, "Key check failed");
                    }
                }
            }
        }

        if answered {
            Eligibility::NotEligible
        } else {
            Eligibility::Unknown
        }
    }
}
