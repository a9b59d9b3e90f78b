//! Discord REST API client.
//!
//! Bot-authenticated calls for the gated guild: member and role lookups, role
//! mutations, guild joins, channel messages and interaction follow-ups.

use std::time::Duration;

use async_trait::async_trait;
use lockgate_core::{ApplicationId, ChannelId, GuildId, RoleId, UserId};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument};

use super::error::DiscordError;
use super::types::{ApiErrorBody, GuildMember, MessagePayload, Role};
use super::{InteractionResponder, RoleGateway};
use crate::config::DiscordConfig;

/// Discord REST API base URL.
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Discord API client bound to one guild.
#[derive(Clone)]
pub struct DiscordClient {
    /// HTTP client.
    client: Client,
    /// API base URL.
    api_base: String,
    /// Bot token for authentication.
    bot_token: SecretString,
    /// Application id, used for interaction webhooks.
    application_id: ApplicationId,
    /// Gated guild.
    guild_id: GuildId,
}

impl std::fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordClient")
            .field("api_base", &self.api_base)
            .field("bot_token", &"[REDACTED]")
            .field("application_id", &self.application_id)
            .field("guild_id", &self.guild_id)
            .finish_non_exhaustive()
    }
}

impl DiscordClient {
    /// Create a new Discord client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &DiscordConfig) -> Result<Self, DiscordError> {
        Self::with_base(
            DISCORD_API_BASE,
            config.bot_token.clone(),
            config.client_id,
            config.guild_id,
            config.timeout,
        )
    }

    /// Create a client against a custom API base.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_base(
        api_base: impl Into<String>,
        bot_token: SecretString,
        application_id: ApplicationId,
        guild_id: GuildId,
        timeout: Duration,
    ) -> Result<Self, DiscordError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DiscordError::Config(e.to_string()))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token,
            application_id,
            guild_id,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    fn bot(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(
            reqwest::header::AUTHORIZATION,
            format!("Bot {}", self.bot_token.expose_secret()),
        )
    }

    /// Send a request, turning non-2xx responses into [`DiscordError::Api`].
    async fn send(&self, request: RequestBuilder) -> Result<Response, DiscordError> {
        let response = self.bot(request).send().await?;

        if response.status().is_success() {
            return Ok(response);
        }

        Err(api_error(response).await)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, DiscordError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| DiscordError::Response(e.to_string()))
    }
}

/// Convert an error response into a [`DiscordError`].
pub(super) async fn api_error(response: Response) -> DiscordError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or(body);

    if status == StatusCode::NOT_FOUND {
        debug!(message = %message, "Discord object not found");
        return DiscordError::NotFound(message);
    }

    error!(status = status.as_u16(), message = %message, "Discord API error");

    DiscordError::Api {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl RoleGateway for DiscordClient {
    #[instrument(skip(self), fields(guild = %self.guild_id))]
    async fn fetch_role(&self, role: RoleId) -> Result<Role, DiscordError> {
        let roles: Vec<Role> = self
            .send_json(
                self.client
                    .get(self.url(&format!("/guilds/{}/roles", self.guild_id))),
            )
            .await?;

        roles
            .into_iter()
            .find(|r| r.id == role)
            .ok_or_else(|| DiscordError::NotFound(format!("role {role}")))
    }

    #[instrument(skip(self), fields(guild = %self.guild_id))]
    async fn fetch_member(&self, user: UserId) -> Result<Option<GuildMember>, DiscordError> {
        let request = self
            .client
            .get(self.url(&format!("/guilds/{}/members/{user}", self.guild_id)));

        match self.send_json(request).await {
            Ok(member) => Ok(Some(member)),
            Err(DiscordError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), fields(guild = %self.guild_id))]
    async fn add_role(&self, user: UserId, role: RoleId) -> Result<(), DiscordError> {
        self.send(self.client.put(self.url(&format!(
            "/guilds/{}/members/{user}/roles/{role}",
            self.guild_id
        ))))
        .await?;

        debug!("Role added");
        Ok(())
    }

    #[instrument(skip(self), fields(guild = %self.guild_id))]
    async fn remove_role(&self, user: UserId, role: RoleId) -> Result<(), DiscordError> {
        self.send(self.client.delete(self.url(&format!(
            "/guilds/{}/members/{user}/roles/{role}",
            self.guild_id
        ))))
        .await?;

        debug!("Role removed");
        Ok(())
    }

    #[instrument(skip(self, access_token), fields(guild = %self.guild_id))]
    async fn join_guild(
        &self,
        user: UserId,
        access_token: &SecretString,
        role: RoleId,
    ) -> Result<(), DiscordError> {
        #[derive(serde::Serialize)]
        struct JoinGuild<'a> {
            access_token: &'a str,
            roles: [RoleId; 1],
        }

        let body = JoinGuild {
            access_token: access_token.expose_secret(),
            roles: [role],
        };

        self.send(
            self.client
                .put(self.url(&format!("/guilds/{}/members/{user}", self.guild_id)))
                .json(&body),
        )
        .await?;

        debug!("User joined guild");
        Ok(())
    }

    #[instrument(skip(self, content))]
    async fn send_welcome(&self, channel: ChannelId, content: &str) -> Result<(), DiscordError> {
        self.send(
            self.client
                .post(self.url(&format!("/channels/{channel}/messages")))
                .json(&MessagePayload::text(content)),
        )
        .await?;

        debug!("Welcome message posted");
        Ok(())
    }
}

#[async_trait]
impl InteractionResponder for DiscordClient {
    #[instrument(skip(self, token, message))]
    async fn edit_original_response(
        &self,
        token: &str,
        message: &MessagePayload,
    ) -> Result<(), DiscordError> {
        // Interaction webhooks are authenticated by the token in the path.
        let response = self
            .client
            .patch(self.url(&format!(
                "/webhooks/{}/{token}/messages/@original",
                self.application_id
            )))
            .json(message)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        debug!("Interaction response edited");
        Ok(())
    }
}
