//! Application state shared across handlers.

use std::sync::Arc;

use chrono::TimeDelta;
use sqlx::PgPool;

use crate::chain::{ChainError, JsonRpcLockReader, LockReader, MembershipOracle, SignatureVerifier};
use crate::config::GateConfig;
use crate::db::{NonceStore, PgNonceStore, PgUserWalletStore, UserWalletStore};
use crate::discord::{
    DiscordClient, DiscordError, DiscordOAuth, IdentityProvider, InteractionResponder,
    InteractionVerifier, RoleGateway,
};
use crate::services::{AccessResolver, AccessSettings, ReconciliationSweeper};

/// Error creating application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("discord setup failed: {0}")]
    Discord(#[from] DiscordError),
    #[error("chain setup failed: {0}")]
    Chain(#[from] ChainError),
}

/// The external collaborators the resolver and sweeper are written against.
///
/// Production wires Postgres and the real Discord and JSON-RPC clients; tests
/// substitute in-memory stores and fakes.
#[derive(Clone)]
pub struct Collaborators {
    pub nonces: Arc<dyn NonceStore>,
    pub users: Arc<dyn UserWalletStore>,
    pub reader: Arc<dyn LockReader>,
    pub gateway: Arc<dyn RoleGateway>,
    pub identity: Arc<dyn IdentityProvider>,
    pub responder: Arc<dyn InteractionResponder>,
}

impl Collaborators {
    /// Wire the production collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn production(config: &GateConfig, pool: PgPool) -> Result<Self, StateError> {
        let discord = Arc::new(DiscordClient::new(&config.discord)?);
        let identity = DiscordOAuth::new(&config.discord, config.public_url("/access"))?;
        let reader = JsonRpcLockReader::new(&config.chain)?;

        Ok(Self {
            nonces: Arc::new(PgNonceStore::new(pool.clone())),
            users: Arc::new(PgUserWalletStore::new(pool)),
            reader: Arc::new(reader),
            gateway: discord.clone(),
            identity: Arc::new(identity),
            responder: discord,
        })
    }

    /// Membership oracle over the configured locks.
    #[must_use]
    pub fn oracle(&self, config: &GateConfig) -> MembershipOracle {
        MembershipOracle::new(self.reader.clone(), config.chain.locks.clone())
    }

    /// Access resolver.
    #[must_use]
    pub fn resolver(&self, config: &GateConfig) -> AccessResolver {
        AccessResolver::new(
            self.nonces.clone(),
            self.users.clone(),
            self.oracle(config),
            SignatureVerifier::new(config.paywall.message_to_sign.clone()),
            self.gateway.clone(),
            AccessSettings::from_config(config),
        )
    }

    /// Reconciliation sweeper.
    #[must_use]
    pub fn sweeper(&self, config: &GateConfig) -> ReconciliationSweeper {
        ReconciliationSweeper::new(
            self.users.clone(),
            self.nonces.clone(),
            self.oracle(config),
            self.gateway.clone(),
            config.discord.role_id,
            TimeDelta::from_std(config.nonce_ttl).unwrap_or(TimeDelta::MAX),
        )
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: GateConfig,
    resolver: AccessResolver,
    identity: Arc<dyn IdentityProvider>,
    responder: Arc<dyn InteractionResponder>,
    interaction_verifier: InteractionVerifier,
    pool: Option<PgPool>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Server configuration
    /// * `collaborators` - Stores and external clients
    /// * `pool` - `PostgreSQL` pool checked by the readiness probe, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the interaction public key is invalid.
    pub fn new(
        config: GateConfig,
        collaborators: &Collaborators,
        pool: Option<PgPool>,
    ) -> Result<Self, StateError> {
        let interaction_verifier = InteractionVerifier::from_hex(&config.discord.public_key)?;
        let resolver = collaborators.resolver(&config);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                resolver,
                identity: collaborators.identity.clone(),
                responder: collaborators.responder.clone(),
                interaction_verifier,
                pool,
            }),
        })
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.inner.config
    }

    /// Get a reference to the access resolver.
    #[must_use]
    pub fn resolver(&self) -> &AccessResolver {
        &self.inner.resolver
    }

    /// Get the OAuth identity provider.
    #[must_use]
    pub fn identity(&self) -> &dyn IdentityProvider {
        self.inner.identity.as_ref()
    }

    /// Get a shared handle to the interaction responder.
    #[must_use]
    pub fn responder(&self) -> Arc<dyn InteractionResponder> {
        self.inner.responder.clone()
    }

    /// Get the interaction signature verifier.
    #[must_use]
    pub fn interaction_verifier(&self) -> &InteractionVerifier {
        &self.inner.interaction_verifier
    }

    /// Get the database pool, if the state is backed by one.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }
}
