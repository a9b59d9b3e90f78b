//! Interaction webhook signature verification.
//!
//! Discord signs every interaction with the application's Ed25519 key over
//! `timestamp || body`:
//! <https://discord.com/developers/docs/interactions/overview#setting-up-an-endpoint-validating-security-request-headers>

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use tracing::{debug, instrument};

use super::error::DiscordError;

/// Header carrying the hex signature.
pub const SIGNATURE_HEADER: &str = "x-signature-ed25519";
/// Header carrying the signed timestamp.
pub const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

/// Maximum accepted clock skew for interaction timestamps.
const MAX_SKEW_SECS: u64 = 300;

/// Verifies inbound interaction requests.
#[derive(Debug, Clone)]
pub struct InteractionVerifier {
    key: VerifyingKey,
}

impl InteractionVerifier {
    /// Create a verifier from the hex public key shown in the developer portal.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not 32 bytes of hex or not a valid
    /// curve point.
    pub fn from_hex(public_key: &str) -> Result<Self, DiscordError> {
        let bytes: [u8; 32] = hex::decode(public_key.trim())
            .map_err(|e| DiscordError::Config(format!("public key: {e}")))?
            .try_into()
            .map_err(|_| DiscordError::Config("public key must be 32 bytes".to_string()))?;

        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| DiscordError::Config(format!("public key: {e}")))?;

        Ok(Self { key })
    }

    /// Verify an interaction request.
    ///
    /// # Arguments
    ///
    /// * `timestamp` - The `X-Signature-Timestamp` header value
    /// * `body` - The raw request body
    /// * `signature` - The `X-Signature-Ed25519` header value
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::InvalidSignature`] if verification fails.
    #[instrument(skip(self, body, signature))]
    pub fn verify(&self, timestamp: &str, body: &[u8], signature: &str) -> Result<(), DiscordError> {
        let ts: i64 = timestamp
            .parse()
            .map_err(|_| DiscordError::InvalidSignature("Invalid timestamp".to_string()))?;

        if chrono::Utc::now().timestamp().abs_diff(ts) > MAX_SKEW_SECS {
            return Err(DiscordError::InvalidSignature(
                "Request timestamp too old".to_string(),
            ));
        }

        let sig_bytes = hex::decode(signature)
            .map_err(|e| DiscordError::InvalidSignature(e.to_string()))?;
        let sig = Signature::from_slice(&sig_bytes)
            .map_err(|e| DiscordError::InvalidSignature(e.to_string()))?;

        let mut message = Vec::with_capacity(timestamp.len() + body.len());
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(body);

        self.key
            .verify(&message, &sig)
            .map_err(|_| DiscordError::InvalidSignature("Signature mismatch".to_string()))?;

        debug!("Interaction signature verified");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ed25519_dalek::{Signer, SigningKey};

    use super::*;

    fn keypair() -> (SigningKey, InteractionVerifier) {
        let signing = SigningKey::from_bytes(&[9u8; 32]);
        let verifier =
            InteractionVerifier::from_hex(&hex::encode(signing.verifying_key().to_bytes()))
                .unwrap();
        (signing, verifier)
    }

    fn sign(key: &SigningKey, timestamp: &str, body: &[u8]) -> String {
        let mut message = timestamp.as_bytes().to_vec();
        message.extend_from_slice(body);
        hex::encode(key.sign(&message).to_bytes())
    }

    #[test]
    fn test_valid_signature() {
        let (key, verifier) = keypair();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let body = br#"{"type":1}"#;

        assert!(verifier.verify(&timestamp, body, &sign(&key, &timestamp, body)).is_ok());
    }

    #[test]
    fn test_tampered_body_fails() {
        let (key, verifier) = keypair();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign(&key, &timestamp, br#"{"type":1}"#);

        let result = verifier.verify(&timestamp, br#"{"type":2}"#, &signature);
        assert!(matches!(result, Err(DiscordError::InvalidSignature(_))));
    }

    #[test]
    fn test_old_timestamp_fails() {
        let (key, verifier) = keypair();
        let timestamp = (chrono::Utc::now().timestamp() - 3600).to_string();
        let body = b"{}";

        let result = verifier.verify(&timestamp, body, &sign(&key, &timestamp, body));
        assert!(matches!(result, Err(DiscordError::InvalidSignature(_))));
    }

    #[test]
    fn test_garbage_inputs_fail() {
        let (_, verifier) = keypair();
        let timestamp = chrono::Utc::now().timestamp().to_string();

        assert!(verifier.verify("not-a-number", b"{}", "00").is_err());
        assert!(verifier.verify(&timestamp, b"{}", "zz").is_err());
        assert!(verifier.verify(&timestamp, b"{}", "abcd").is_err());
    }

    #[test]
    fn test_extreme_timestamps_rejected() {
        let (_, verifier) = keypair();

        for timestamp in [i64::MIN.to_string(), i64::MAX.to_string()] {
            let result = verifier.verify(&timestamp, b"{}", "00");
            assert!(matches!(result, Err(DiscordError::InvalidSignature(_))));
        }
    }

    #[test]
    fn test_from_hex_rejects_bad_keys() {
        assert!(InteractionVerifier::from_hex("abcd").is_err());
        assert!(InteractionVerifier::from_hex("not hex").is_err());
    }
}
