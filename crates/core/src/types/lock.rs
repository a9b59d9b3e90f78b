//! Lock descriptors: the on-chain contracts whose keys grant membership.

use core::fmt;
use core::str::FromStr;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`LockDescriptor`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LockParseError {
    /// The entry is not `address:network[:name]`.
    #[error("lock entry {0:?} must look like 0xADDRESS:NETWORK[:NAME]")]
    Malformed(String),
    /// The contract address is not valid hex.
    #[error("invalid lock contract address {0:?}")]
    InvalidAddress(String),
    /// The network is not a numeric chain id.
    #[error("invalid lock network {0:?}")]
    InvalidNetwork(String),
}

/// One qualifying NFT contract.
///
/// The configured list of descriptors forms an "or" set: holding a key on any
/// one of them is enough. List order is evaluation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockDescriptor {
    /// Contract address of the lock.
    pub contract_address: Address,
    /// EVM chain id the lock is deployed on.
    pub network: u64,
    /// Human readable name, shown in the checkout.
    pub name: String,
}

impl LockDescriptor {
    /// Parse a comma separated list of `address:network[:name]` entries.
    ///
    /// Blank entries are skipped, so trailing commas are harmless.
    ///
    /// # Errors
    ///
    /// Returns the first entry that fails to parse.
    ///
    /// # Examples
    ///
    /// ```
    /// use lockgate_core::LockDescriptor;
    ///
    /// let locks = LockDescriptor::parse_list(
    ///     "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed:5:Bankship, \
    ///      0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359:137",
    /// )
    /// .unwrap();
    /// assert_eq!(locks.len(), 2);
    /// assert_eq!(locks[0].name, "Bankship");
    /// assert_eq!(locks[1].network, 137);
    /// ```
    pub fn parse_list(s: &str) -> Result<Vec<Self>, LockParseError> {
        s.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for LockDescriptor {
    type Err = LockParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, ':');
        let (Some(address), Some(network)) = (parts.next(), parts.next()) else {
            return Err(LockParseError::Malformed(s.to_owned()));
        };

        let contract_address = Address::from_str(address.trim())
            .map_err(|_| LockParseError::InvalidAddress(address.to_owned()))?;
        let network = network
            .trim()
            .parse::<u64>()
            .map_err(|_| LockParseError::InvalidNetwork(network.to_owned()))?;
        let name = parts
            .next()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map_or_else(|| contract_address.to_checksum(None), String::from);

        Ok(Self {
            contract_address,
            network,
            name,
        })
    }
}

impl fmt::Display for LockDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} on chain {})",
            self.name,
            self.contract_address.to_checksum(None),
            self.network
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry_defaults_name_to_address() {
        let lock: LockDescriptor = "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB:1".parse().unwrap();
        assert_eq!(lock.network, 1);
        assert_eq!(lock.name, "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB");
    }

    #[test]
    fn test_parse_list_keeps_order_and_skips_blanks() {
        let locks = LockDescriptor::parse_list(
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb:5:First,,\
             0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB:10:Second,",
        )
        .unwrap();
        let names: Vec<_> = locks.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["First", "Second"]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb".parse::<LockDescriptor>(),
            Err(LockParseError::Malformed(_))
        ));
        assert!(matches!(
            "nope:5".parse::<LockDescriptor>(),
            Err(LockParseError::InvalidAddress(_))
        ));
        assert!(matches!(
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb:goerli".parse::<LockDescriptor>(),
            Err(LockParseError::InvalidNetwork(_))
        ));
    }

    #[test]
    fn test_empty_list() {
        assert!(LockDescriptor::parse_list("  ").unwrap().is_empty());
    }
}
