//! Newtype IDs for Discord snowflakes.
//!
//! Use the `define_snowflake!` macro to create type-safe ID wrappers that
//! prevent accidentally passing a role ID where a user ID is expected.

use serde::Deserialize;

/// Errors that can occur when parsing a snowflake from a string.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid snowflake: {0:?}")]
pub struct SnowflakeError(pub String);

/// Wire representation accepted when deserializing a snowflake.
///
/// Discord sends snowflakes as JSON strings; numbers are accepted as well so
/// that hand-written fixtures and config files can use either form.
#[doc(hidden)]
#[derive(Deserialize)]
#[serde(untagged)]
pub enum SnowflakeRepr {
    Str(String),
    Num(u64),
}

/// Macro to define a type-safe snowflake ID wrapper.
///
/// Creates a newtype wrapper around `u64` with:
/// - `Serialize` as a decimal string, `Deserialize` from a string or number
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `Ord`
/// - `new()`, `get()`, `Display` and `FromStr`
/// - `sqlx` `Type`, `Encode`, and `Decode` as `TEXT` (with `postgres` feature)
///
/// # Example
///
/// ```rust
/// # use lockgate_core::define_snowflake;
/// define_snowflake!(UserId);
/// define_snowflake!(RoleId);
///
/// let user: UserId = "80351110224678912".parse().unwrap();
/// assert_eq!(user.get(), 80_351_110_224_678_912);
///
/// // These are different types, so this won't compile:
/// // let _: RoleId = user;
/// ```
#[macro_export]
macro_rules! define_snowflake {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Create a new ID from a raw snowflake.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the underlying snowflake value.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = $crate::SnowflakeError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map(Self)
                    .map_err(|_| $crate::SnowflakeError(s.to_owned()))
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<S: ::serde::Serializer>(
                &self,
                serializer: S,
            ) -> ::core::result::Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D: ::serde::Deserializer<'de>>(
                deserializer: D,
            ) -> ::core::result::Result<Self, D::Error> {
                match <$crate::SnowflakeRepr as ::serde::Deserialize>::deserialize(deserializer)? {
                    $crate::SnowflakeRepr::Num(id) => Ok(Self(id)),
                    $crate::SnowflakeRepr::Str(s) => s.parse().map_err(::serde::de::Error::custom),
                }
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Type<::sqlx::Postgres> for $name {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <String as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <String as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $name {
            fn decode(
                value: ::sqlx::postgres::PgValueRef<'r>,
            ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
                let raw = <&str as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
                Ok(raw.parse::<Self>()?)
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut ::sqlx::postgres::PgArgumentBuffer,
            ) -> ::std::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
                <String as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0.to_string(), buf)
            }
        }
    };
}

define_snowflake!(UserId);
define_snowflake!(GuildId);
define_snowflake!(RoleId);
define_snowflake!(ChannelId);
define_snowflake!(ApplicationId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let id: UserId = "80351110224678912".parse().unwrap();
        assert_eq!(id.get(), 80_351_110_224_678_912);
        assert_eq!(id.to_string(), "80351110224678912");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<RoleId>().is_err());
        assert!("abc".parse::<RoleId>().is_err());
        assert!("-1".parse::<RoleId>().is_err());
    }

    #[test]
    fn test_serde_uses_strings() {
        let id = GuildId::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"42\"");

        let from_str: GuildId = serde_json::from_str("\"42\"").unwrap();
        let from_num: GuildId = serde_json::from_str("42").unwrap();
        assert_eq!(from_str, id);
        assert_eq!(from_num, id);
    }
}
