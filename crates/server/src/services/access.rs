//! Access resolution: turns a nonce plus a wallet signature into a role grant.
//!
//! # Flow
//!
//! 1. A user without a qualifying wallet gets a nonce bound to their user id
//! 2. Checkout redirects back with the nonce and a signature of the challenge
//! 3. [`AccessResolver::resolve_access`] claims the nonce (single use),
//!    recovers the wallet, records it, asks the oracle and grants the role
//!
//! Wallets that already qualify skip checkout: [`AccessResolver::request_access`]
//! grants directly, and [`AccessResolver::begin_oauth`] /
//! [`AccessResolver::complete_oauth`] handle a signature that arrives without
//! a nonce by identifying the user through Discord OAuth.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use lockgate_core::{ChannelId, NonceId, RoleId, UserId, WalletAddress};
use secrecy::SecretString;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::chain::{MembershipCheck, MembershipOracle, SignatureVerifier};
use crate::config::GateConfig;
use crate::db::{ClaimOutcome, NonceStore, RepositoryError, UserWalletStore};
use crate::discord::{DiscordError, DiscordUser, RoleGateway};

/// Errors that stop a resolution.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Unknown or expired nonce.
    #[error("nonce not found")]
    NonceNotFound,

    /// The nonce was already used.
    #[error("nonce already processed")]
    AlreadyProcessed,

    /// The nonce was never bound to a Discord user.
    #[error("nonce is not bound to a user")]
    NonceUnbound,

    /// The OAuth state nonce carries no verified wallet.
    #[error("state does not carry a verified wallet")]
    MissingWallet,

    /// Store failure.
    #[error("store error: {0}")]
    Repository(#[from] RepositoryError),

    /// Discord failure.
    #[error("gateway error: {0}")]
    Gateway(#[from] DiscordError),
}

/// Result of resolving a nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessOutcome {
    /// The role was granted (or already held).
    Granted {
        user: UserId,
        wallet: WalletAddress,
    },
    /// The signature was invalid or the wallet holds no qualifying key.
    NotQualified { wallet: Option<WalletAddress> },
    /// No lock could be queried; the wallet is on file for the next sweep.
    OracleUnavailable { wallet: WalletAddress },
}

/// Result of the `/unlock` fast path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// The user already holds the role.
    AlreadyMember,
    /// A wallet on file qualified and the role was granted.
    Granted { wallet: WalletAddress },
    /// No wallet on file qualifies; checkout with this nonce.
    CheckoutRequired { nonce: NonceId },
    /// Every wallet check failed for lack of chain access.
    OracleUnavailable,
}

/// Result of checking a nonce-less signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthStart {
    /// The wallet qualifies; continue with OAuth using `state`.
    Qualified {
        wallet: WalletAddress,
        state: NonceId,
    },
    /// The signature is invalid or the wallet does not qualify.
    NotQualified,
    /// No lock could be queried.
    OracleUnavailable,
}

/// Static settings for the resolver.
#[derive(Debug, Clone)]
pub struct AccessSettings {
    /// Role granted to members.
    pub role_id: RoleId,
    /// Channel receiving welcome messages.
    pub welcome_channel: ChannelId,
    /// Channel new members are pointed to.
    pub unlocked_channel: ChannelId,
    /// Community name.
    pub server_name: String,
    /// Nonce lifetime.
    pub nonce_ttl: TimeDelta,
}

impl AccessSettings {
    /// Derive settings from the server configuration.
    #[must_use]
    pub fn from_config(config: &GateConfig) -> Self {
        Self {
            role_id: config.discord.role_id,
            welcome_channel: config.discord.channel_id,
            unlocked_channel: config.discord.unlocked_channel_id,
            server_name: config.server_name.clone(),
            nonce_ttl: TimeDelta::from_std(config.nonce_ttl).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Text of the welcome message for `user`.
    #[must_use]
    pub fn welcome_message(&self, user: UserId) -> String {
        format!(
            "Welcome to the {} Community, <@{user}>. You can start sending messages now. \
             Head over to <#{}> and tell us a little more about yourself.",
            self.server_name, self.unlocked_channel
        )
    }
}

/// Orchestrates nonces, signatures, the oracle and the role gateway.
#[derive(Clone)]
pub struct AccessResolver {
    nonces: Arc<dyn NonceStore>,
    users: Arc<dyn UserWalletStore>,
    oracle: MembershipOracle,
    verifier: SignatureVerifier,
    gateway: Arc<dyn RoleGateway>,
    settings: AccessSettings,
}

impl std::fmt::Debug for AccessResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessResolver")
            .field("oracle", &self.oracle)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl AccessResolver {
    /// Create a resolver.
    #[must_use]
    pub fn new(
        nonces: Arc<dyn NonceStore>,
        users: Arc<dyn UserWalletStore>,
        oracle: MembershipOracle,
        verifier: SignatureVerifier,
        gateway: Arc<dyn RoleGateway>,
        settings: AccessSettings,
    ) -> Self {
        Self {
            nonces,
            users,
            oracle,
            verifier,
            gateway,
            settings,
        }
    }

    /// Resolver settings.
    #[must_use]
    pub const fn settings(&self) -> &AccessSettings {
        &self.settings
    }

    /// Issue a nonce for `owner` (checkout without a prior `/unlock`).
    ///
    /// # Errors
    ///
    /// Returns an error if the nonce cannot be stored.
    pub async fn issue_nonce(&self, owner: Option<UserId>) -> Result<NonceId, AccessError> {
        Ok(self.nonces.create(owner).await?)
    }

    /// Resolve a checkout return: nonce plus wallet signature.
    ///
    /// The nonce is consumed whatever the verdict; only a grant deletes it.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::NonceNotFound`], [`AccessError::NonceUnbound`]
    /// or [`AccessError::AlreadyProcessed`] for nonce problems, and
    /// store/gateway errors for infrastructure failures.
    #[instrument(skip(self, nonce_id, signature), fields(nonce = %nonce_id))]
    pub async fn resolve_access(
        &self,
        nonce_id: &NonceId,
        signature: &str,
    ) -> Result<AccessOutcome, AccessError> {
        let nonce = self
            .nonces
            .get(nonce_id)
            .await?
            .filter(|n| !n.is_expired(Utc::now(), self.settings.nonce_ttl))
            .ok_or(AccessError::NonceNotFound)?;

        let Some(user) = nonce.owner_user_id else {
            return Err(AccessError::NonceUnbound);
        };

        match self.nonces.mark_processed(nonce_id).await? {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::AlreadyProcessed => return Err(AccessError::AlreadyProcessed),
            ClaimOutcome::NotFound => return Err(AccessError::NonceNotFound),
        }

        let wallet = match self.verifier.recover_signer(signature) {
            Ok(wallet) => wallet,
            Err(e) => {
                info!(user = %user, error = %e, "Signature rejected");
                return Ok(AccessOutcome::NotQualified { wallet: None });
            }
        };

        self.users.add_wallet(user, wallet).await?;

        match self.oracle.check_membership(&wallet).await {
            MembershipCheck::Member { lock } => {
                debug!(user = %user, wallet = %wallet, lock = %lock, "Wallet qualifies");
                self.grant(user).await?;
                self.nonces.delete(nonce_id).await?;
                info!(user = %user, wallet = %wallet, "Access granted");
                Ok(AccessOutcome::Granted { user, wallet })
            }
            MembershipCheck::NotMember => {
                info!(user = %user, wallet = %wallet, "Wallet does not qualify");
                Ok(AccessOutcome::NotQualified {
                    wallet: Some(wallet),
                })
            }
            MembershipCheck::Unavailable { failures } => {
                warn!(user = %user, wallet = %wallet, failures, "Membership unknown");
                Ok(AccessOutcome::OracleUnavailable { wallet })
            }
        }
    }

    /// The `/unlock` fast path for a user already inside the guild.
    ///
    /// # Errors
    ///
    /// Returns store/gateway errors.
    #[instrument(skip(self))]
    pub async fn request_access(&self, user: UserId) -> Result<UnlockOutcome, AccessError> {
        if let Some(member) = self.gateway.fetch_member(user).await?
            && member.has_role(self.settings.role_id)
        {
            return Ok(UnlockOutcome::AlreadyMember);
        }

        let wallets = self
            .users
            .get(user)
            .await?
            .map(|r| r.wallet_addresses)
            .unwrap_or_default();

        let mut unavailable = 0;
        for wallet in &wallets {
            match self.oracle.check_membership(wallet).await {
                MembershipCheck::Member { .. } => {
                    self.grant(user).await?;
                    info!(user = %user, wallet = %wallet, "Access granted from wallet on file");
                    return Ok(UnlockOutcome::Granted { wallet: *wallet });
                }
                MembershipCheck::NotMember => {}
                MembershipCheck::Unavailable { .. } => unavailable += 1,
            }
        }

        if !wallets.is_empty() && unavailable == wallets.len() {
            return Ok(UnlockOutcome::OracleUnavailable);
        }

        let nonce = self.nonces.create(Some(user)).await?;
        debug!(user = %user, "Checkout required");
        Ok(UnlockOutcome::CheckoutRequired { nonce })
    }

    /// Check a signature that arrived without a nonce.
    ///
    /// A qualifying wallet gets a single-use OAuth `state` nonce carrying it.
    ///
    /// # Errors
    ///
    /// Returns an error if the state nonce cannot be stored.
    #[instrument(skip(self, signature))]
    pub async fn begin_oauth(&self, signature: &str) -> Result<OAuthStart, AccessError> {
        let wallet = match self.verifier.recover_signer(signature) {
            Ok(wallet) => wallet,
            Err(e) => {
                info!(error = %e, "Signature rejected");
                return Ok(OAuthStart::NotQualified);
            }
        };

        match self.oracle.check_membership(&wallet).await {
            MembershipCheck::Member { .. } => {
                let state = self.nonces.create_with_wallet(None, wallet).await?;
                Ok(OAuthStart::Qualified { wallet, state })
            }
            MembershipCheck::NotMember => Ok(OAuthStart::NotQualified),
            MembershipCheck::Unavailable { .. } => Ok(OAuthStart::OracleUnavailable),
        }
    }

    /// Finish the OAuth path: claim the state and put the user in the guild.
    ///
    /// # Errors
    ///
    /// Returns nonce errors for a bad state, [`AccessError::MissingWallet`]
    /// if the state was not issued by [`Self::begin_oauth`], and
    /// store/gateway errors.
    #[instrument(skip(self, state, user, access_token), fields(state = %state, user = %user.id))]
    pub async fn complete_oauth(
        &self,
        state: &NonceId,
        user: &DiscordUser,
        access_token: &SecretString,
    ) -> Result<WalletAddress, AccessError> {
        let nonce = self
            .nonces
            .get(state)
            .await?
            .filter(|n| !n.is_expired(Utc::now(), self.settings.nonce_ttl))
            .ok_or(AccessError::NonceNotFound)?;

        let wallet = nonce.wallet_address.ok_or(AccessError::MissingWallet)?;

        match self.nonces.mark_processed(state).await? {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::AlreadyProcessed => return Err(AccessError::AlreadyProcessed),
            ClaimOutcome::NotFound => return Err(AccessError::NonceNotFound),
        }

        self.nonces.bind_owner(state, user.id).await?;
        self.users.add_wallet(user.id, wallet).await?;

        match self.gateway.fetch_member(user.id).await? {
            Some(member) if member.has_role(self.settings.role_id) => {
                debug!("Already holds role");
            }
            Some(_) => {
                self.gateway.add_role(user.id, self.settings.role_id).await?;
            }
            None => {
                self.gateway
                    .join_guild(user.id, access_token, self.settings.role_id)
                    .await?;
            }
        }

        self.welcome(user.id).await;
        self.nonces.delete(state).await?;

        info!(wallet = %wallet, name = %user.display_name(), "Access granted via OAuth");
        Ok(wallet)
    }

    /// Grant the role if not already held, then welcome.
    async fn grant(&self, user: UserId) -> Result<(), AccessError> {
        let role = self.gateway.fetch_role(self.settings.role_id).await?;
        let member = self
            .gateway
            .fetch_member(user)
            .await?
            .ok_or_else(|| DiscordError::NotFound(format!("member {user}")))?;

        if member.has_role(role.id) {
            debug!(user = %user, role = %role.name, "Role already held");
        } else {
            self.gateway.add_role(user, role.id).await?;
        }

        self.welcome(user).await;
        Ok(())
    }

    /// Post the welcome message. Failures are logged only.
    async fn welcome(&self, user: UserId) {
        let content = self.settings.welcome_message(user);
        if let Err(e) = self
            .gateway
            .send_welcome(self.settings.welcome_channel, &content)
            .await
        {
            warn!(user = %user, error = %e, "Failed to send welcome message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let config = crate::config::tests::test_config();
        let settings = AccessSettings::from_config(&config);

        assert_eq!(settings.role_id, RoleId::new(3003));
        assert_eq!(settings.nonce_ttl, TimeDelta::hours(24));
        assert_eq!(
            settings.welcome_message(UserId::new(42)),
            "Welcome to the Bankship Community, <@42>. You can start sending messages now. \
             Head over to <#5005> and tell us a little more about yourself."
        );
    }
}
