//! Chain-related errors.

use thiserror::Error;

/// Errors from a single JSON-RPC lock query.
#[derive(Debug, Error)]
pub enum ChainError {
    /// HTTP request failed (connection, TLS, non-2xx).
    #[error("RPC request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("RPC request timed out")]
    Timeout,

    /// The node returned a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the node.
        message: String,
    },

    /// The response could not be decoded.
    #[error("invalid RPC response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// Signature recovery failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// The signature is not valid hex or has the wrong length.
    #[error("malformed signature: {0}")]
    Malformed(String),

    /// No address can be recovered from the signature.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}
