//! Discord OAuth2 (authorization code grant).
//!
//! Used after a wallet proved membership without a nonce: the user authorizes
//! `identify guilds.join`, and the resulting token both identifies them and
//! lets the bot add them to the guild.

use std::time::Duration;

use async_trait::async_trait;
use lockgate_core::{ApplicationId, NonceId};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};
use url::Url;

use super::IdentityProvider;
use super::client::{DISCORD_API_BASE, api_error};
use super::error::DiscordError;
use super::types::{DiscordUser, TokenResponse};
use crate::config::DiscordConfig;

/// Authorization endpoint.
const AUTHORIZE_URL: &str = "https://discord.com/oauth2/authorize";

/// Scopes requested from the user.
pub const OAUTH_SCOPES: &str = "identify guilds.join";

/// Discord OAuth2 client.
#[derive(Clone)]
pub struct DiscordOAuth {
    client: Client,
    api_base: String,
    authorize_base: Url,
    client_id: ApplicationId,
    client_secret: SecretString,
    redirect_uri: Url,
}

impl std::fmt::Debug for DiscordOAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordOAuth")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri.as_str())
            .finish_non_exhaustive()
    }
}

impl DiscordOAuth {
    /// Create a client that redirects back to `redirect_uri`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &DiscordConfig, redirect_uri: Url) -> Result<Self, DiscordError> {
        Self::with_base(
            DISCORD_API_BASE,
            config.client_id,
            config.client_secret.clone(),
            redirect_uri,
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
        client_id: ApplicationId,
        client_secret: SecretString,
        redirect_uri: Url,
        timeout: Duration,
    ) -> Result<Self, DiscordError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DiscordError::Config(e.to_string()))?;
        let authorize_base =
            Url::parse(AUTHORIZE_URL).map_err(|e| DiscordError::Config(e.to_string()))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            authorize_base,
            client_id,
            client_secret,
            redirect_uri,
        })
    }
}

#[async_trait]
impl IdentityProvider for DiscordOAuth {
    fn authorize_url(&self, state: &NonceId) -> Url {
        let mut url = self.authorize_base.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id.to_string())
            .append_pair("redirect_uri", self.redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", OAUTH_SCOPES)
            .append_pair("state", state.as_str());
        url
    }

    #[instrument(skip(self, code))]
    async fn exchange_code(&self, code: &str) -> Result<SecretString, DiscordError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let response = self
            .client
            .post(format!("{}/oauth2/token", self.api_base))
            .basic_auth(self.client_id, Some(self.client_secret.expose_secret()))
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| DiscordError::Response(e.to_string()))?;

        debug!(
            token_type = %token.token_type,
            scope = ?token.scope,
            expires_in = ?token.expires_in,
            "OAuth code exchanged"
        );

        Ok(SecretString::from(token.access_token))
    }

    #[instrument(skip(self, access_token))]
    async fn current_user(&self, access_token: &SecretString) -> Result<DiscordUser, DiscordError> {
        let response = self
            .client
            .get(format!("{}/users/@me", self.api_base))
            .bearer_auth(access_token.expose_secret())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| DiscordError::Response(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_url_carries_state_and_scopes() {
        let oauth = DiscordOAuth::with_base(
            "https://discord.test/api/v10",
            ApplicationId::new(1001),
            SecretString::from("client-secret-value"),
            "https://gate.example.org/access".parse().unwrap(),
            Duration::from_secs(5),
        )
        .unwrap();
        let state = NonceId::parse("abc123").unwrap();

        let url = oauth.authorize_url(&state);
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("discord.com"));
        assert_eq!(pairs["client_id"], "1001");
        assert_eq!(pairs["redirect_uri"], "https://gate.example.org/access");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["scope"], "identify guilds.join");
        assert_eq!(pairs["state"], "abc123");
        assert!(!format!("{oauth:?}").contains("client-secret-value"));
    }
}
