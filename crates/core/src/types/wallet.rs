//! Wallet address type.

use core::fmt;
use core::str::FromStr;

use alloy_primitives::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors that can occur when parsing a [`WalletAddress`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletAddressError {
    /// The input string is empty.
    #[error("wallet address cannot be empty")]
    Empty,
    /// The input is not a 20-byte hex address.
    #[error("invalid wallet address {0:?}")]
    Invalid(String),
}

/// An EVM account address recovered from a signature.
///
/// Parsing accepts any letter case; the canonical form (used for display,
/// serialization and storage) is the EIP-55 checksummed string, so the same
/// account always maps to the same stored key.
///
/// ## Examples
///
/// ```
/// use lockgate_core::WalletAddress;
///
/// let lower: WalletAddress = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap();
/// assert_eq!(lower.to_string(), "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
///
/// assert!("0x1234".parse::<WalletAddress>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalletAddress(Address);

impl WalletAddress {
    /// Wrap a raw address.
    #[must_use]
    pub const fn new(address: Address) -> Self {
        Self(address)
    }

    /// Parse an address from a hex string (with or without `0x`).
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or is not 20 bytes of hex.
    pub fn parse(s: &str) -> Result<Self, WalletAddressError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(WalletAddressError::Empty);
        }
        Address::from_str(trimmed)
            .map(Self)
            .map_err(|_| WalletAddressError::Invalid(trimmed.to_owned()))
    }

    /// Returns the underlying address.
    #[must_use]
    pub const fn as_address(&self) -> &Address {
        &self.0
    }

    /// Returns the EIP-55 checksummed representation.
    #[must_use]
    pub fn to_checksum(&self) -> String {
        self.0.to_checksum(None)
    }
}

impl From<Address> for WalletAddress {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl From<WalletAddress> for Address {
    fn from(wallet: WalletAddress) -> Self {
        wallet.0
    }
}

impl FromStr for WalletAddress {
    type Err = WalletAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl Serialize for WalletAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_checksum())
    }
}

impl<'de> Deserialize<'de> for WalletAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for WalletAddress {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for WalletAddress {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let raw = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(raw)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for WalletAddress {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.to_checksum(), buf)
    }
}
