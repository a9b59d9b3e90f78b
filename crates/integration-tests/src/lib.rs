//! Integration tests for Lockgate.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p lockgate-integration-tests
//! ```
//!
//! No database or network is needed: every test runs against the in-memory
//! stores and the fakes in this crate.
//!
//! # Test Categories
//!
//! - `resolver` - Nonce resolution, `/unlock` fast path, OAuth path
//! - `sweeper` - Reconciliation grants, revocations and failure isolation
//! - `oracle` - Multi-lock aggregation
//! - `routes` - HTTP routes through the axum router
//! - `interactions` - Signed Discord interaction webhooks

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{Address, U256, eip191_hash_message};
use async_trait::async_trait;
use axum::Router;
use dashmap::{DashMap, DashSet};
use ed25519_dalek::Signer;
use k256::ecdsa::SigningKey;
use lockgate_core::{
    ApplicationId, ChannelId, GuildId, LockDescriptor, NonceId, RoleId, UserId, WalletAddress,
};
use lockgate_server::chain::{ChainError, LockReader};
use lockgate_server::config::{
    ChainConfig, DEFAULT_CHECKOUT_URL, DiscordConfig, GateConfig, PaywallConfig,
    default_message_to_sign,
};
use lockgate_server::db::{InMemoryNonceStore, InMemoryUserWalletStore};
use lockgate_server::discord::{
    DiscordError, DiscordUser, GuildMember, IdentityProvider, InteractionResponder,
    MessagePayload, Role, RoleGateway,
};
use lockgate_server::routes;
use lockgate_server::services::{AccessResolver, ReconciliationSweeper};
use lockgate_server::state::{AppState, Collaborators};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Notify;
use url::Url;

pub const SERVER_NAME: &str = "Bankship";
pub const GUILD: GuildId = GuildId::new(2002);
pub const ROLE: RoleId = RoleId::new(3003);
pub const WELCOME_CHANNEL: ChannelId = ChannelId::new(4004);
pub const UNLOCKED_CHANNEL: ChannelId = ChannelId::new(5005);
pub const APPLICATION: ApplicationId = ApplicationId::new(1001);

/// Two locks on different networks, in evaluation order.
pub const LOCKS: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed:5:Bankship,\
                         0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359:137:Bankship Polygon";

// =============================================================================
// Configuration and keys
// =============================================================================

/// Ed25519 key standing in for Discord's interaction signing key.
#[must_use]
pub fn interaction_signing_key() -> ed25519_dalek::SigningKey {
    ed25519_dalek::SigningKey::from_bytes(&[9u8; 32])
}

/// Sign an interaction body the way Discord does.
#[must_use]
pub fn sign_interaction(timestamp: &str, body: &[u8]) -> String {
    let mut message = timestamp.as_bytes().to_vec();
    message.extend_from_slice(body);
    hex::encode(interaction_signing_key().sign(&message).to_bytes())
}

/// Gate configuration used by every test.
///
/// # Panics
///
/// Panics if the constant URLs or lock list fail to parse.
#[must_use]
pub fn test_config() -> GateConfig {
    GateConfig {
        database_url: SecretString::from("postgres://localhost/lockgate_test"),
        host: "127.0.0.1".parse().expect("valid host"),
        port: 8080,
        base_url: "https://gate.example.org".parse().expect("valid base url"),
        server_name: SERVER_NAME.to_string(),
        discord: DiscordConfig {
            client_id: APPLICATION,
            client_secret: SecretString::from("k3Jx9qLmP2vR8sTn"),
            bot_token: SecretString::from("Mz1Nq8Rt5Wv2Yb7Cd4Fg"),
            public_key: hex::encode(interaction_signing_key().verifying_key().as_bytes()),
            guild_id: GUILD,
            role_id: ROLE,
            channel_id: WELCOME_CHANNEL,
            unlocked_channel_id: UNLOCKED_CHANNEL,
            timeout: Duration::from_secs(5),
        },
        chain: ChainConfig {
            rpc_url: "http://localhost:8545".parse().expect("valid rpc url"),
            network_rpc_urls: HashMap::new(),
            locks: LockDescriptor::parse_list(LOCKS).expect("valid locks"),
            timeout: Duration::from_secs(5),
        },
        paywall: PaywallConfig {
            checkout_url: DEFAULT_CHECKOUT_URL.parse().expect("valid checkout url"),
            message_to_sign: default_message_to_sign(SERVER_NAME),
        },
        sweep_interval: Duration::from_secs(3600),
        nonce_ttl: Duration::from_secs(86_400),
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// A wallet backed by a secp256k1 key.
pub struct TestWallet {
    key: SigningKey,
}

impl TestWallet {
    /// Deterministic wallet from a one-byte seed (must be non-zero).
    ///
    /// # Panics
    ///
    /// Panics if `seed` is zero.
    #[must_use]
    pub fn from_seed(seed: u8) -> Self {
        let key = SigningKey::from_slice(&[seed; 32]).expect("non-zero seed is a valid key");
        Self { key }
    }

    /// The wallet's address.
    #[must_use]
    pub fn address(&self) -> WalletAddress {
        WalletAddress::new(Address::from_public_key(self.key.verifying_key()))
    }

    /// EIP-191 `personal_sign` of `message`, as `0x`-prefixed hex.
    ///
    /// # Panics
    ///
    /// Panics if signing fails.
    #[must_use]
    pub fn sign(&self, message: &str) -> String {
        let digest = eip191_hash_message(message);
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest.as_slice())
            .expect("signing succeeds");
        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(27 + recovery_id.to_byte());
        format!("0x{}", hex::encode(bytes))
    }

    /// Sign the configured challenge.
    #[must_use]
    pub fn sign_challenge(&self) -> String {
        self.sign(&default_message_to_sign(SERVER_NAME))
    }
}

// =============================================================================
// Fake lock reader
// =============================================================================

/// Lock reader answering from an in-memory key table.
#[derive(Default)]
pub struct FakeLockReader {
    keys: DashSet<(Address, WalletAddress)>,
    failing: DashSet<Address>,
    calls: DashMap<Address, usize>,
}

impl FakeLockReader {
    /// Give `wallet` a valid key on `lock`.
    pub fn grant_key(&self, lock: &LockDescriptor, wallet: WalletAddress) {
        self.keys.insert((lock.contract_address, wallet));
    }

    /// Expire `wallet`'s key on `lock`.
    pub fn expire_key(&self, lock: &LockDescriptor, wallet: WalletAddress) {
        self.keys.remove(&(lock.contract_address, wallet));
    }

    /// Make every query against `lock` fail.
    pub fn fail_lock(&self, lock: &LockDescriptor) {
        self.failing.insert(lock.contract_address);
    }

    /// Number of queries made against `lock`.
    #[must_use]
    pub fn calls(&self, lock: &LockDescriptor) -> usize {
        self.calls
            .get(&lock.contract_address)
            .map_or(0, |count| *count)
    }

    fn query(&self, lock: &LockDescriptor, wallet: &WalletAddress) -> Result<bool, ChainError> {
        *self.calls.entry(lock.contract_address).or_insert(0) += 1;
        if self.failing.contains(&lock.contract_address) {
            return Err(ChainError::Timeout);
        }
        Ok(self.keys.contains(&(lock.contract_address, *wallet)))
    }
}

#[async_trait]
impl LockReader for FakeLockReader {
    async fn balance_of(
        &self,
        lock: &LockDescriptor,
        wallet: &WalletAddress,
    ) -> Result<U256, ChainError> {
        self.query(lock, wallet).map(|held| U256::from(u8::from(held)))
    }

    async fn has_valid_key(
        &self,
        lock: &LockDescriptor,
        wallet: &WalletAddress,
    ) -> Result<bool, ChainError> {
        self.query(lock, wallet)
    }
}

// =============================================================================
// Fake role gateway
// =============================================================================

/// A mutation recorded by [`FakeGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    AddRole(UserId, RoleId),
    RemoveRole(UserId, RoleId),
    JoinGuild(UserId, RoleId),
    Welcome(ChannelId, String),
}

/// In-memory guild.
pub struct FakeGateway {
    role: Role,
    members: DashMap<UserId, GuildMember>,
    failing_members: DashSet<UserId>,
    calls: Mutex<Vec<GatewayCall>>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            role: Role {
                id: ROLE,
                name: "Member".to_string(),
            },
            members: DashMap::new(),
            failing_members: DashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeGateway {
    /// Put `user` in the guild, optionally holding the role.
    pub fn add_member(&self, user: UserId, with_role: bool) {
        let member = GuildMember {
            user: Some(discord_user(user)),
            nick: None,
            roles: if with_role { vec![ROLE] } else { Vec::new() },
        };
        self.members.insert(user, member);
    }

    /// Make lookups of `user` fail.
    pub fn fail_member(&self, user: UserId) {
        self.failing_members.insert(user);
    }

    /// Whether `user` is in the guild and holds the role.
    #[must_use]
    pub fn has_role(&self, user: UserId) -> bool {
        self.members
            .get(&user)
            .is_some_and(|m| m.has_role(ROLE))
    }

    /// Whether `user` is in the guild.
    #[must_use]
    pub fn is_member(&self, user: UserId) -> bool {
        self.members.contains_key(&user)
    }

    /// Mutations so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the call log lock is poisoned.
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().expect("call log lock").clone()
    }

    /// Role mutations so far (welcome messages excluded).
    #[must_use]
    pub fn role_mutations(&self) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, GatewayCall::Welcome(..)))
            .collect()
    }

    fn record(&self, call: GatewayCall) {
        self.calls.lock().expect("call log lock").push(call);
    }

    fn check_failing(&self, user: UserId) -> Result<(), DiscordError> {
        if self.failing_members.contains(&user) {
            return Err(DiscordError::Api {
                status: 500,
                message: format!("member {user} unavailable"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RoleGateway for FakeGateway {
    async fn fetch_role(&self, role: RoleId) -> Result<Role, DiscordError> {
        if role == self.role.id {
            Ok(self.role.clone())
        } else {
            Err(DiscordError::NotFound(format!("role {role}")))
        }
    }

    async fn fetch_member(&self, user: UserId) -> Result<Option<GuildMember>, DiscordError> {
        self.check_failing(user)?;
        Ok(self.members.get(&user).map(|m| m.clone()))
    }

    async fn add_role(&self, user: UserId, role: RoleId) -> Result<(), DiscordError> {
        self.check_failing(user)?;
        let mut member = self
            .members
            .get_mut(&user)
            .ok_or_else(|| DiscordError::NotFound(format!("member {user}")))?;
        if !member.roles.contains(&role) {
            member.roles.push(role);
        }
        drop(member);
        self.record(GatewayCall::AddRole(user, role));
        Ok(())
    }

    async fn remove_role(&self, user: UserId, role: RoleId) -> Result<(), DiscordError> {
        self.check_failing(user)?;
        if let Some(mut member) = self.members.get_mut(&user) {
            member.roles.retain(|r| *r != role);
        }
        self.record(GatewayCall::RemoveRole(user, role));
        Ok(())
    }

    async fn join_guild(
        &self,
        user: UserId,
        _access_token: &SecretString,
        role: RoleId,
    ) -> Result<(), DiscordError> {
        self.members.insert(
            user,
            GuildMember {
                user: Some(discord_user(user)),
                nick: None,
                roles: vec![role],
            },
        );
        self.record(GatewayCall::JoinGuild(user, role));
        Ok(())
    }

    async fn send_welcome(&self, channel: ChannelId, content: &str) -> Result<(), DiscordError> {
        self.record(GatewayCall::Welcome(channel, content.to_string()));
        Ok(())
    }
}

/// A Discord user named after its id.
#[must_use]
pub fn discord_user(id: UserId) -> DiscordUser {
    DiscordUser {
        id,
        username: format!("user{id}"),
        global_name: None,
    }
}

// =============================================================================
// Fake identity provider
// =============================================================================

/// OAuth provider that knows a fixed set of authorization codes.
#[derive(Default)]
pub struct FakeIdentity {
    codes: DashMap<String, UserId>,
}

impl FakeIdentity {
    /// Register `code` as authorizing `user`.
    pub fn register_code(&self, code: &str, user: UserId) {
        self.codes.insert(code.to_string(), user);
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    fn authorize_url(&self, state: &NonceId) -> Url {
        let mut url: Url = "https://discord.com/oauth2/authorize"
            .parse()
            .expect("valid authorize url");
        url.query_pairs_mut().append_pair("state", state.as_str());
        url
    }

    async fn exchange_code(&self, code: &str) -> Result<SecretString, DiscordError> {
        self.codes
            .get(code)
            .map(|user| SecretString::from(format!("token-{}", *user)))
            .ok_or_else(|| DiscordError::Api {
                status: 400,
                message: "invalid_grant".to_string(),
            })
    }

    async fn current_user(&self, access_token: &SecretString) -> Result<DiscordUser, DiscordError> {
        access_token
            .expose_secret()
            .strip_prefix("token-")
            .and_then(|id| id.parse::<UserId>().ok())
            .map(discord_user)
            .ok_or_else(|| DiscordError::Api {
                status: 401,
                message: "invalid token".to_string(),
            })
    }
}

// =============================================================================
// Fake interaction responder
// =============================================================================

/// Records edits of deferred interaction replies.
#[derive(Default)]
pub struct FakeResponder {
    edits: Mutex<Vec<(String, MessagePayload)>>,
    notify: Notify,
}

impl FakeResponder {
    /// Wait (up to five seconds) for the first edit.
    ///
    /// # Panics
    ///
    /// Panics if no edit arrives in time.
    pub async fn first_edit(&self) -> (String, MessagePayload) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(edit) = self.edits.lock().expect("edits lock").first().cloned() {
                    return edit;
                }
                self.notify.notified().await;
            }
        })
        .await
        .expect("deferred reply was edited")
    }
}

#[async_trait]
impl InteractionResponder for FakeResponder {
    async fn edit_original_response(
        &self,
        token: &str,
        message: &MessagePayload,
    ) -> Result<(), DiscordError> {
        self.edits
            .lock()
            .expect("edits lock")
            .push((token.to_string(), message.clone()));
        self.notify.notify_one();
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

/// Every collaborator, in memory, plus the configuration tying them together.
pub struct Harness {
    pub config: GateConfig,
    pub nonces: Arc<InMemoryNonceStore>,
    pub users: Arc<InMemoryUserWalletStore>,
    pub reader: Arc<FakeLockReader>,
    pub gateway: Arc<FakeGateway>,
    pub identity: Arc<FakeIdentity>,
    pub responder: Arc<FakeResponder>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    /// Fresh harness with empty stores and an empty guild.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: test_config(),
            nonces: Arc::new(InMemoryNonceStore::new()),
            users: Arc::new(InMemoryUserWalletStore::new()),
            reader: Arc::new(FakeLockReader::default()),
            gateway: Arc::new(FakeGateway::default()),
            identity: Arc::new(FakeIdentity::default()),
            responder: Arc::new(FakeResponder::default()),
        }
    }

    /// The `index`th configured lock.
    ///
    /// # Panics
    ///
    /// Panics if there is no such lock.
    #[must_use]
    pub fn lock(&self, index: usize) -> &LockDescriptor {
        self.config.chain.locks.get(index).expect("configured lock")
    }

    /// Collaborators as trait objects.
    #[must_use]
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            nonces: self.nonces.clone(),
            users: self.users.clone(),
            reader: self.reader.clone(),
            gateway: self.gateway.clone(),
            identity: self.identity.clone(),
            responder: self.responder.clone(),
        }
    }

    /// Access resolver wired to the fakes.
    #[must_use]
    pub fn resolver(&self) -> AccessResolver {
        self.collaborators().resolver(&self.config)
    }

    /// Sweeper wired to the fakes.
    #[must_use]
    pub fn sweeper(&self) -> ReconciliationSweeper {
        self.collaborators().sweeper(&self.config)
    }

    /// The application router without rate limiting.
    ///
    /// # Panics
    ///
    /// Panics if the state cannot be built.
    #[must_use]
    pub fn router(&self) -> Router {
        let state = AppState::new(self.config.clone(), &self.collaborators(), None)
            .expect("state builds");
        routes::routes().with_state(state)
    }
}
