//! Wallet ownership proofs.
//!
//! Wallets prove ownership by `personal_sign`-ing a fixed challenge message
//! (EIP-191 prefix, secp256k1). Recovering the signer gives the wallet.

use alloy_primitives::Signature;
use lockgate_core::WalletAddress;
use tracing::debug;

use super::error::SignatureError;

/// Length of an `r || s || v` signature.
const SIGNATURE_LEN: usize = 65;

/// Recovers signer wallets for the configured challenge message.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    message: String,
}

impl SignatureVerifier {
    /// Create a verifier for `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Recover the wallet that produced `signature` over the challenge.
    ///
    /// Accepts hex with or without `0x`, with `v` as 0/1 or 27/28.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::Malformed`] for anything that is not 65 bytes
    /// of hex, and [`SignatureError::InvalidSignature`] when recovery fails.
    pub fn recover_signer(&self, signature: &str) -> Result<WalletAddress, SignatureError> {
        let trimmed = signature.trim();
        let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);

        let bytes = hex::decode(hex_part).map_err(|e| SignatureError::Malformed(e.to_string()))?;
        if bytes.len() != SIGNATURE_LEN {
            return Err(SignatureError::Malformed(format!(
                "expected {SIGNATURE_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let sig = Signature::try_from(bytes.as_slice())
            .map_err(|e| SignatureError::InvalidSignature(e.to_string()))?;

        let address = sig
            .recover_address_from_msg(self.message.as_bytes())
            .map_err(|e| SignatureError::InvalidSignature(e.to_string()))?;

        debug!(wallet = %address, "Recovered signer");
        Ok(WalletAddress::new(address))
    }
}
