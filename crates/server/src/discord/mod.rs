//! Discord integration.
//!
//! This module provides:
//! - [`DiscordClient`] for guild, role and message operations (bot token)
//! - [`DiscordOAuth`] for the authorization code flow
//! - [`InteractionVerifier`] for interaction webhook signatures
//! - The seams the resolver and sweeper are written against:
//!   [`RoleGateway`], [`IdentityProvider`] and [`InteractionResponder`]
//!
//! # Flow
//!
//! 1. A user runs `/unlock` (or clicks the unlock button)
//! 2. The interaction webhook is verified and answered with a deferred reply
//! 3. The access resolver decides, mutating roles through [`RoleGateway`]
//! 4. The deferred reply is edited with the result via [`InteractionResponder`]

mod client;
mod error;
mod interactions;
pub mod messages;
mod oauth;
pub mod types;

use async_trait::async_trait;
use lockgate_core::{ChannelId, NonceId, RoleId, UserId};
use secrecy::SecretString;
use url::Url;

pub use client::{DISCORD_API_BASE, DiscordClient};
pub use error::DiscordError;
pub use interactions::{InteractionVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER};
pub use oauth::{DiscordOAuth, OAUTH_SCOPES};
pub use types::{DiscordUser, GuildMember, MessagePayload, Role};

/// Guild membership and role operations for the gated guild.
///
/// Role mutations are idempotent on Discord's side: adding a held role or
/// removing an absent one succeeds without change.
#[async_trait]
pub trait RoleGateway: Send + Sync {
    /// Look up a role of the guild.
    async fn fetch_role(&self, role: RoleId) -> Result<Role, DiscordError>;

    /// Look up a guild member; `None` if the user is not in the guild.
    async fn fetch_member(&self, user: UserId) -> Result<Option<GuildMember>, DiscordError>;

    /// Grant `role` to `user`.
    async fn add_role(&self, user: UserId, role: RoleId) -> Result<(), DiscordError>;

    /// Revoke `role` from `user`.
    async fn remove_role(&self, user: UserId, role: RoleId) -> Result<(), DiscordError>;

    /// Add `user` to the guild with `role`, using their OAuth token.
    async fn join_guild(
        &self,
        user: UserId,
        access_token: &SecretString,
        role: RoleId,
    ) -> Result<(), DiscordError>;

    /// Post a welcome message to `channel`.
    async fn send_welcome(&self, channel: ChannelId, content: &str) -> Result<(), DiscordError>;
}

/// OAuth identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Consent screen URL carrying `state`.
    fn authorize_url(&self, state: &NonceId) -> Url;

    /// Exchange an authorization code for an access token.
    async fn exchange_code(&self, code: &str) -> Result<SecretString, DiscordError>;

    /// The user the token belongs to.
    async fn current_user(&self, access_token: &SecretString) -> Result<DiscordUser, DiscordError>;
}

/// Follow-up channel for deferred interaction replies.
#[async_trait]
pub trait InteractionResponder: Send + Sync {
    /// Replace the deferred "thinking" reply identified by `token`.
    async fn edit_original_response(
        &self,
        token: &str,
        message: &MessagePayload,
    ) -> Result<(), DiscordError>;
}
