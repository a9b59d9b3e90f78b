//! Checkout redirect.
//!
//! Sends the browser to the external checkout with a `paywallConfig` naming
//! the qualifying locks and the challenge to sign. The checkout returns to
//! `/access/{nonce}` when a nonce is present, `/membership` otherwise.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    response::Response,
};
use lockgate_core::NonceId;
use serde::Serialize;
use url::Url;

use super::found;
use crate::config::GateConfig;
use crate::error::{AppError, Result};
use crate::services::AccessError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaywallPayload<'a> {
    message_to_sign: &'a str,
    pessimistic: bool,
    locks: BTreeMap<String, LockEntry<'a>>,
    metadata_inputs: [MetadataInput; 1],
}

#[derive(Debug, Serialize)]
struct LockEntry<'a> {
    name: &'a str,
    network: u64,
}

#[derive(Debug, Serialize)]
struct MetadataInput {
    name: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    required: bool,
}

/// Build the external checkout URL.
///
/// # Errors
///
/// Returns an error if the paywall configuration cannot be serialized.
pub fn checkout_url(config: &GateConfig, nonce: Option<&NonceId>) -> Result<Url> {
    let payload = PaywallPayload {
        message_to_sign: &config.paywall.message_to_sign,
        pessimistic: true,
        locks: config
            .chain
            .locks
            .iter()
            .map(|lock| {
                (
                    lock.contract_address.to_checksum(None),
                    LockEntry {
                        name: &lock.name,
                        network: lock.network,
                    },
                )
            })
            .collect(),
        metadata_inputs: [MetadataInput {
            name: "email",
            kind: "email",
            required: true,
        }],
    };
    let paywall_config =
        serde_json::to_string(&payload).map_err(|e| AppError::Internal(e.to_string()))?;

    let redirect_uri = match nonce {
        Some(nonce) => config.public_url(&format!("/access/{nonce}")),
        None => config.public_url("/membership"),
    };

    let mut url = config.paywall.checkout_url.clone();
    url.query_pairs_mut()
        .append_pair("paywallConfig", &paywall_config)
        .append_pair("redirectUri", redirect_uri.as_str());
    Ok(url)
}

/// Checkout for a wallet not yet tied to a Discord user.
pub async fn start(State(state): State<AppState>) -> Result<Response> {
    let url = checkout_url(state.config(), None)?;
    Ok(found(url.as_str()))
}

/// Checkout for the user the nonce was issued to.
pub async fn start_with_nonce(
    State(state): State<AppState>,
    Path(nonce): Path<String>,
) -> Result<Response> {
    let nonce = NonceId::parse(&nonce).map_err(|_| AccessError::NonceNotFound)?;
    let url = checkout_url(state.config(), Some(&nonce))?;
    Ok(found(url.as_str()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;

    fn query(url: &Url, key: &str) -> String {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[test]
    fn test_checkout_url_with_nonce() {
        let config = test_config();
        let nonce = NonceId::parse("abc123").unwrap();
        let url = checkout_url(&config, Some(&nonce)).unwrap();

        assert!(url.as_str().starts_with("https://app.unlock-protocol.com/checkout?"));
        assert_eq!(
            query(&url, "redirectUri"),
            "https://gate.example.org/access/abc123"
        );

        let paywall: serde_json::Value =
            serde_json::from_str(&query(&url, "paywallConfig")).unwrap();
        assert_eq!(
            paywall["messageToSign"],
            "Allow access to the Bankship Discord Community"
        );
        assert_eq!(paywall["pessimistic"], true);
        assert_eq!(
            paywall["locks"]["0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"]["network"],
            5
        );
        assert_eq!(paywall["metadataInputs"][0]["type"], "email");
    }

    #[test]
    fn test_checkout_url_without_nonce_returns_to_membership() {
        let url = checkout_url(&test_config(), None).unwrap();
        assert_eq!(
            query(&url, "redirectUri"),
            "https://gate.example.org/membership"
        );
    }
}
