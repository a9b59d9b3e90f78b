//! Ethereum JSON-RPC lock reader.
//!
//! Issues read-only `eth_call`s against Unlock-style lock contracts:
//! `balanceOf(address)` for access checks and `getHasValidKey(address)` for
//! reconciliation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, U256, keccak256};
use async_trait::async_trait;
use lockgate_core::{LockDescriptor, WalletAddress};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use super::LockReader;
use super::error::ChainError;
use crate::config::ChainConfig;

/// ABI signature of the balance query.
const BALANCE_OF: &str = "balanceOf(address)";
/// ABI signature of the key validity query.
const GET_HAS_VALID_KEY: &str = "getHasValidKey(address)";

/// First four bytes of the keccak hash of a function signature.
fn selector(signature: &str) -> [u8; 4] {
    let [a, b, c, d, ..] = keccak256(signature.as_bytes()).0;
    [a, b, c, d]
}

/// ABI-encode a single-address call.
fn encode_address_call(signature: &str, address: &Address) -> String {
    let mut data = Vec::with_capacity(4 + 32);
    data.extend_from_slice(&selector(signature));
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(address.as_slice());
    format!("0x{}", hex::encode(data))
}

/// Decode a single 32-byte return word.
fn decode_word(result: &str) -> Result<U256, ChainError> {
    let hex_part = result.strip_prefix("0x").unwrap_or(result);
    let bytes = hex::decode(hex_part).map_err(|e| ChainError::InvalidResponse(e.to_string()))?;

    let word = bytes.get(..32).ok_or_else(|| {
        ChainError::InvalidResponse(format!("expected 32 bytes, got {}", bytes.len()))
    })?;

    U256::try_from_be_slice(word)
        .ok_or_else(|| ChainError::InvalidResponse("word does not fit in U256".to_string()))
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: (CallParams<'a>, &'static str),
}

#[derive(Serialize)]
struct CallParams<'a> {
    to: String,
    data: &'a str,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Lock reader backed by Ethereum JSON-RPC nodes.
///
/// Each lock is queried on the endpoint configured for its network, falling
/// back to the default endpoint.
#[derive(Debug)]
pub struct JsonRpcLockReader {
    client: Client,
    default_url: Url,
    network_urls: HashMap<u64, Url>,
    next_id: AtomicU64,
}

impl JsonRpcLockReader {
    /// Create a reader from chain configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ChainConfig) -> Result<Self, ChainError> {
        Self::with_endpoints(
            config.rpc_url.clone(),
            config.network_rpc_urls.clone(),
            config.timeout,
        )
    }

    /// Create a reader from explicit endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_endpoints(
        default_url: Url,
        network_urls: HashMap<u64, Url>,
        timeout: Duration,
    ) -> Result<Self, ChainError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Request(e.to_string()))?;

        Ok(Self {
            client,
            default_url,
            network_urls,
            next_id: AtomicU64::new(1),
        })
    }

    /// Endpoint used for `network`.
    #[must_use]
    pub fn endpoint_for(&self, network: u64) -> &Url {
        self.network_urls.get(&network).unwrap_or(&self.default_url)
    }

    async fn eth_call(&self, lock: &LockDescriptor, data: &str) -> Result<String, ChainError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: "eth_call",
            params: (
                CallParams {
                    to: lock.contract_address.to_checksum(None),
                    data,
                },
                "latest",
            ),
        };

        let response = self
            .client
            .post(self.endpoint_for(lock.network).clone())
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(ChainError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        body.result
            .ok_or_else(|| ChainError::InvalidResponse("missing result".to_string()))
    }
}

#[async_trait]
impl LockReader for JsonRpcLockReader {
    #[instrument(skip(self, lock), fields(lock = %lock.name, network = lock.network))]
    async fn balance_of(
        &self,
        lock: &LockDescriptor,
        wallet: &WalletAddress,
    ) -> Result<U256, ChainError> {
        let data = encode_address_call(BALANCE_OF, wallet.as_address());
        let balance = decode_word(&self.eth_call(lock, &data).await?)?;
        debug!(%balance, "balanceOf");
        Ok(balance)
    }

    #[instrument(skip(self, lock), fields(lock = %lock.name, network = lock.network))]
    async fn has_valid_key(
        &self,
        lock: &LockDescriptor,
        wallet: &WalletAddress,
    ) -> Result<bool, ChainError> {
        let data = encode_address_call(GET_HAS_VALID_KEY, wallet.as_address());
        let valid = !decode_word(&self.eth_call(lock, &data).await?)?.is_zero();
        debug!(valid, "getHasValidKey");
        Ok(valid)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_known_selectors() {
        assert_eq!(hex::encode(selector(BALANCE_OF)), "70a08231");
        assert_eq!(
            hex::encode(selector("transfer(address,uint256)")),
            "a9059cbb"
        );
    }

    #[test]
    fn test_encode_address_call() {
        let address: Address = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".parse().unwrap();
        let data = encode_address_call(BALANCE_OF, &address);

        assert_eq!(data.len(), 2 + 2 * 36);
        assert!(data.starts_with("0x70a08231000000000000000000000000"));
        assert!(data.ends_with("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"));
    }

    #[test]
    fn test_decode_word() {
        let one = format!("0x{}01", "00".repeat(31));
        assert_eq!(decode_word(&one).unwrap(), U256::from(1));

        let zero = format!("0x{}", "00".repeat(32));
        assert!(decode_word(&zero).unwrap().is_zero());

        assert!(decode_word("0x").is_err());
        assert!(decode_word("0xzz").is_err());
    }

    #[test]
    fn test_endpoint_for_network() {
        let mut overrides = HashMap::new();
        overrides.insert(137, "https://polygon.example".parse().unwrap());
        let reader = JsonRpcLockReader::with_endpoints(
            "http://localhost:8545".parse().unwrap(),
            overrides,
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(reader.endpoint_for(137).host_str(), Some("polygon.example"));
        assert_eq!(reader.endpoint_for(1).host_str(), Some("localhost"));
    }
}
