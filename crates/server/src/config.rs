//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `LOCKGATE_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `LOCKGATE_BASE_URL` - Public URL of this service, used for redirect URIs
//! - `SERVER_NAME` - Community name shown in messages and the challenge text
//! - `DISCORD_CLIENT_ID` - Discord application (OAuth client) ID
//! - `DISCORD_CLIENT_SECRET` - Discord OAuth client secret
//! - `DISCORD_BOT_TOKEN` - Bot token used for guild and role operations
//! - `DISCORD_PUBLIC_KEY` - Hex Ed25519 key used to verify interaction webhooks
//! - `DISCORD_GUILD_ID` - Gated guild
//! - `DISCORD_ROLE_ID` - Role granted to members
//! - `DISCORD_CHANNEL_ID` - Channel receiving welcome messages
//! - `UNLOCKED_CHANNEL_ID` - Channel new members are pointed to
//! - `RPC_PROVIDER_URL` - Default Ethereum JSON-RPC endpoint
//! - `LOCKS` - Comma separated `0xADDRESS:NETWORK[:NAME]` lock list
//!
//! ## Optional
//! - `LOCKGATE_HOST` - Bind address (default: 0.0.0.0)
//! - `LOCKGATE_PORT` / `PORT` - Listen port (default: 8080)
//! - `RPC_PROVIDER_URL_<CHAIN_ID>` - Per-network JSON-RPC endpoint override
//! - `CHECKOUT_URL` - Checkout page (default: Unlock Protocol checkout)
//! - `MESSAGE_TO_SIGN` - Challenge text (default derived from `SERVER_NAME`)
//! - `SWEEP_INTERVAL_SECS` - Reconciliation period (default: 3600)
//! - `NONCE_TTL_SECS` - Nonce lifetime (default: 86400)
//! - `RPC_TIMEOUT_SECS` - JSON-RPC request timeout (default: 10)
//! - `DISCORD_TIMEOUT_SECS` - Discord API request timeout (default: 10)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use lockgate_core::{ApplicationId, ChannelId, GuildId, LockDescriptor, RoleId};
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Default checkout page.
pub const DEFAULT_CHECKOUT_URL: &str = "https://app.unlock-protocol.com/checkout";

/// Prefix of per-network RPC endpoint variables.
const NETWORK_RPC_PREFIX: &str = "RPC_PROVIDER_URL_";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL, used to build redirect URIs
    pub base_url: Url,
    /// Community name
    pub server_name: String,
    /// Discord application and guild configuration
    pub discord: DiscordConfig,
    /// Chain and lock configuration
    pub chain: ChainConfig,
    /// Checkout configuration
    pub paywall: PaywallConfig,
    /// Reconciliation sweep period
    pub sweep_interval: Duration,
    /// How long an issued nonce stays valid
    pub nonce_ttl: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Discord application and guild configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct DiscordConfig {
    /// Application (OAuth client) ID
    pub client_id: ApplicationId,
    /// OAuth client secret
    pub client_secret: SecretString,
    /// Bot token
    pub bot_token: SecretString,
    /// Hex encoded Ed25519 public key for interaction webhooks
    pub public_key: String,
    /// Gated guild
    pub guild_id: GuildId,
    /// Role granted to members
    pub role_id: RoleId,
    /// Channel receiving welcome messages
    pub channel_id: ChannelId,
    /// Channel new members are pointed to
    pub unlocked_channel_id: ChannelId,
    /// Request timeout for Discord API calls
    pub timeout: Duration,
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("bot_token", &"[REDACTED]")
            .field("public_key", &self.public_key)
            .field("guild_id", &self.guild_id)
            .field("role_id", &self.role_id)
            .field("channel_id", &self.channel_id)
            .field("unlocked_channel_id", &self.unlocked_channel_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Chain access configuration.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Default JSON-RPC endpoint
    pub rpc_url: Url,
    /// Per chain id endpoint overrides
    pub network_rpc_urls: HashMap<u64, Url>,
    /// Qualifying locks, in evaluation order
    pub locks: Vec<LockDescriptor>,
    /// Request timeout for RPC calls
    pub timeout: Duration,
}

/// Checkout (paywall) configuration.
#[derive(Debug, Clone)]
pub struct PaywallConfig {
    /// External checkout page
    pub checkout_url: Url,
    /// Fixed challenge message wallets sign
    pub message_to_sign: String,
}

impl GateConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("LOCKGATE_DATABASE_URL")?;
        let host = parse_env("LOCKGATE_HOST", &get_env_or_default("LOCKGATE_HOST", "0.0.0.0"))?;
        let port = std::env::var("LOCKGATE_PORT")
            .or_else(|_| std::env::var("PORT"))
            .unwrap_or_else(|_| "8080".to_string());
        let port = parse_env("LOCKGATE_PORT", &port)?;
        let base_url = parse_url("LOCKGATE_BASE_URL", &get_required_env("LOCKGATE_BASE_URL")?)?;
        let server_name = get_required_env("SERVER_NAME")?;

        let discord = DiscordConfig::from_env()?;
        let chain = ChainConfig::from_env()?;
        let paywall = PaywallConfig::from_env(&server_name)?;

        let sweep_interval = get_duration_secs("SWEEP_INTERVAL_SECS", 3600)?;
        let nonce_ttl = get_nonce_ttl()?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            server_name,
            discord,
            chain,
            paywall,
            sweep_interval,
            nonce_ttl,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Build an absolute URL for a path on this service.
    #[must_use]
    pub fn public_url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(path);
        url.set_query(None);
        url
    }

    /// Deep link into the gated guild.
    #[must_use]
    pub fn guild_url(&self) -> String {
        format!("https://discord.com/channels/{}", self.discord.guild_id)
    }
}

impl DiscordConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let public_key = get_required_env("DISCORD_PUBLIC_KEY")?;
        validate_public_key(&public_key, "DISCORD_PUBLIC_KEY")?;

        Ok(Self {
            client_id: get_snowflake("DISCORD_CLIENT_ID")?,
            client_secret: get_validated_secret("DISCORD_CLIENT_SECRET")?,
            bot_token: get_validated_secret("DISCORD_BOT_TOKEN")?,
            public_key,
            guild_id: get_snowflake("DISCORD_GUILD_ID")?,
            role_id: get_snowflake("DISCORD_ROLE_ID")?,
            channel_id: get_snowflake("DISCORD_CHANNEL_ID")?,
            unlocked_channel_id: get_snowflake("UNLOCKED_CHANNEL_ID")?,
            timeout: get_duration_secs("DISCORD_TIMEOUT_SECS", 10)?,
        })
    }
}

impl ChainConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let rpc_url = parse_url("RPC_PROVIDER_URL", &get_required_env("RPC_PROVIDER_URL")?)?;
        let network_rpc_urls = parse_network_rpc_urls(std::env::vars())?;
        let locks = LockDescriptor::parse_list(&get_required_env("LOCKS")?)
            .map_err(|e| ConfigError::InvalidEnvVar("LOCKS".to_string(), e.to_string()))?;

        if locks.is_empty() {
            return Err(ConfigError::InvalidEnvVar(
                "LOCKS".to_string(),
                "at least one lock is required".to_string(),
            ));
        }

        Ok(Self {
            rpc_url,
            network_rpc_urls,
            locks,
            timeout: get_duration_secs("RPC_TIMEOUT_SECS", 10)?,
        })
    }
}

impl PaywallConfig {
    fn from_env(server_name: &str) -> Result<Self, ConfigError> {
        let checkout_url = parse_url(
            "CHECKOUT_URL",
            &get_env_or_default("CHECKOUT_URL", DEFAULT_CHECKOUT_URL),
        )?;
        let message_to_sign = get_optional_env("MESSAGE_TO_SIGN")
            .unwrap_or_else(|| default_message_to_sign(server_name));

        Ok(Self {
            checkout_url,
            message_to_sign,
        })
    }
}

/// Challenge text used when `MESSAGE_TO_SIGN` is not set.
#[must_use]
pub fn default_message_to_sign(server_name: &str) -> String {
    format!("Allow access to the {server_name} Discord Community")
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a value, reporting failures against `key`.
fn parse_env<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    parse_env(key, value)
}

/// Get a required Discord snowflake.
fn get_snowflake<T>(key: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    parse_env(key, &get_required_env(key)?)
}

/// Get a duration in whole seconds, rejecting zero.
fn get_duration_secs(key: &str, default: u64) -> Result<Duration, ConfigError> {
    let secs: u64 = match get_optional_env(key) {
        Some(value) => parse_env(key, &value)?,
        None => default,
    };
    if secs == 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

/// Get the nonce lifetime, rejecting values a timestamp cannot be offset by.
fn get_nonce_ttl() -> Result<Duration, ConfigError> {
    let ttl = get_duration_secs("NONCE_TTL_SECS", 86_400)?;
    validate_nonce_ttl(ttl)?;
    Ok(ttl)
}

fn validate_nonce_ttl(ttl: Duration) -> Result<(), ConfigError> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| Utc::now().checked_sub_signed(delta))
        .map(|_| ())
        .ok_or_else(|| {
            ConfigError::InvalidEnvVar(
                "NONCE_TTL_SECS".to_string(),
                format!("{} seconds is out of range", ttl.as_secs()),
            )
        })
}

/// Collect `RPC_PROVIDER_URL_<CHAIN_ID>` overrides.
fn parse_network_rpc_urls(
    vars: impl Iterator<Item = (String, String)>,
) -> Result<HashMap<u64, Url>, ConfigError> {
    let mut urls = HashMap::new();
    for (key, value) in vars {
        let Some(chain_id) = key.strip_prefix(NETWORK_RPC_PREFIX) else {
            continue;
        };
        let chain_id = parse_env::<u64>(&key, chain_id)?;
        urls.insert(chain_id, parse_url(&key, &value)?);
    }
    Ok(urls)
}

/// Validate that the interaction public key is 32 bytes of hex.
fn validate_public_key(value: &str, var_name: &str) -> Result<(), ConfigError> {
    match hex::decode(value.trim()) {
        Ok(bytes) if bytes.len() == 32 => Ok(()),
        Ok(bytes) => Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("expected 32 bytes, got {}", bytes.len()),
        )),
        Err(e) => Err(ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string())),
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the value issued by Discord."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    /// Configuration used by unit tests across the crate.
    pub(crate) fn test_config() -> GateConfig {
        GateConfig {
            database_url: SecretString::from("postgres://localhost/lockgate_test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 8080,
            base_url: "https://gate.example.org".parse().unwrap(),
            server_name: "Bankship".to_string(),
            discord: DiscordConfig {
                client_id: ApplicationId::new(1001),
                client_secret: SecretString::from("super_secret_client_secret"),
                bot_token: SecretString::from("super_secret_bot_token"),
                public_key: "00".repeat(32),
                guild_id: GuildId::new(2002),
                role_id: RoleId::new(3003),
                channel_id: ChannelId::new(4004),
                unlocked_channel_id: ChannelId::new(5005),
                timeout: Duration::from_secs(10),
            },
            chain: ChainConfig {
                rpc_url: "http://localhost:8545".parse().unwrap(),
                network_rpc_urls: HashMap::new(),
                locks: LockDescriptor::parse_list(
                    "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed:5:Bankship",
                )
                .unwrap(),
                timeout: Duration::from_secs(10),
            },
            paywall: PaywallConfig {
                checkout_url: DEFAULT_CHECKOUT_URL.parse().unwrap(),
                message_to_sign: default_message_to_sign("Bankship"),
            },
            sweep_interval: Duration::from_secs(3600),
            nonce_ttl: Duration::from_secs(86_400),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-bot-token-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_public_key() {
        assert!(validate_public_key(&"ab".repeat(32), "KEY").is_ok());
        assert!(validate_public_key(&"ab".repeat(31), "KEY").is_err());
        assert!(validate_public_key("not-hex", "KEY").is_err());
    }

    #[test]
    fn test_parse_network_rpc_urls() {
        let vars = vec![
            ("RPC_PROVIDER_URL".to_string(), "http://default".to_string()),
            ("RPC_PROVIDER_URL_137".to_string(), "https://polygon.example".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ];
        let urls = parse_network_rpc_urls(vars.into_iter()).unwrap();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[&137].host_str(), Some("polygon.example"));
    }

    #[test]
    fn test_parse_network_rpc_urls_rejects_bad_chain_id() {
        let vars = vec![("RPC_PROVIDER_URL_MAINNET".to_string(), "http://x".to_string())];
        assert!(parse_network_rpc_urls(vars.into_iter()).is_err());
    }

    #[test]
    fn test_validate_nonce_ttl() {
        assert!(validate_nonce_ttl(Duration::from_secs(86_400)).is_ok());
        assert!(matches!(
            validate_nonce_ttl(Duration::from_secs(10_000_000_000_000)),
            Err(ConfigError::InvalidEnvVar(key, _)) if key == "NONCE_TTL_SECS"
        ));
        assert!(validate_nonce_ttl(Duration::from_secs(u64::MAX)).is_err());
    }

    #[test]
    fn test_default_message_to_sign() {
        assert_eq!(
            default_message_to_sign("Bankship"),
            "Allow access to the Bankship Discord Community"
        );
    }

    #[test]
    fn test_public_url_and_guild_url() {
        let config = test_config();
        assert_eq!(
            config.public_url("/access/abc").as_str(),
            "https://gate.example.org/access/abc"
        );
        assert_eq!(config.guild_url(), "https://discord.com/channels/2002");
        assert_eq!(config.socket_addr().port(), 8080);
    }

    #[test]
    fn test_discord_config_debug_redacts_secrets() {
        let debug_output = format!("{:?}", test_config().discord);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_client_secret"));
        assert!(!debug_output.contains("super_secret_bot_token"));
    }
}
