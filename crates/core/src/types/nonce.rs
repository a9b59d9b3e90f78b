//! Single-use nonces binding a checkout session to a Discord user.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};

use super::id::UserId;
use super::wallet::WalletAddress;

/// Errors that can occur when parsing a [`NonceId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NonceIdError {
    /// The input string is empty.
    #[error("nonce cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("nonce must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains characters outside `[A-Za-z0-9_-]`.
    #[error("nonce contains invalid characters")]
    InvalidCharacters,
}

/// Opaque, URL-safe nonce identifier.
///
/// Freshly generated ids are 32 alphanumeric characters (~190 bits of
/// entropy). Parsing is slightly more lenient (hyphens and underscores,
/// up to 64 characters) so ids issued as UUIDs remain addressable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NonceId(String);

impl NonceId {
    /// Length of generated ids.
    pub const GENERATED_LENGTH: usize = 32;
    /// Maximum accepted length when parsing.
    pub const MAX_LENGTH: usize = 64;

    /// Generate a new random nonce id.
    #[must_use]
    pub fn generate() -> Self {
        let id = rand::rng()
            .sample_iter(Alphanumeric)
            .take(Self::GENERATED_LENGTH)
            .map(char::from)
            .collect();
        Self(id)
    }

    /// Parse a nonce id received from a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, too long, or contains
    /// characters that could not have been generated.
    pub fn parse(s: &str) -> Result<Self, NonceIdError> {
        if s.is_empty() {
            return Err(NonceIdError::Empty);
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(NonceIdError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(NonceIdError::InvalidCharacters);
        }
        Ok(Self(s.to_owned()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for NonceId {
    type Err = NonceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for NonceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NonceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A stored nonce.
///
/// Lifecycle: created unprocessed, flipped to `processed` exactly once when a
/// resolution claims it, deleted after a successful grant. A processed nonce
/// never triggers another grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce {
    /// Nonce identifier.
    pub id: NonceId,
    /// Discord user the nonce was issued to, if known.
    pub owner_user_id: Option<UserId>,
    /// Wallet already verified before the nonce was issued (OAuth state).
    pub wallet_address: Option<WalletAddress>,
    /// Whether a resolution has claimed this nonce.
    pub processed: bool,
    /// When the nonce was issued.
    pub created_at: DateTime<Utc>,
}

impl Nonce {
    /// Create a fresh, unprocessed nonce.
    #[must_use]
    pub fn issue(owner_user_id: Option<UserId>, wallet_address: Option<WalletAddress>) -> Self {
        Self {
            id: NonceId::generate(),
            owner_user_id,
            wallet_address,
            processed: false,
            created_at: Utc::now(),
        }
    }

    /// Whether the nonce is older than `ttl` at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }
}
