//! Crypto error types.

use thiserror::Error;

/// Cipher operation errors.
///
/// Every decrypt-side failure maps to one of these; no partial plaintext is
/// ever returned alongside an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// Key material has the wrong length or encoding
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Ciphertext is not valid base64
    #[error("Invalid base64: {0}")]
    Base64(String),

    /// Ciphertext length is not a positive multiple of the AES block
    #[error("Ciphertext length {0} is not block aligned")]
    Misaligned(usize),

    /// Trailing padding byte out of range or padding bytes inconsistent
    #[error("Invalid padding byte: {0}")]
    BadPadding(u8),

    /// Plaintext shorter than its framing claims
    #[error("Truncated plaintext: {0}")]
    Truncated(String),

    /// Message or receiver id is not UTF-8
    #[error("Plaintext is not valid UTF-8")]
    InvalidUtf8,

    /// Envelope was addressed to a different receiver
    #[error("Receiver id mismatch: expected {expected}, got {actual}")]
    ReceiverMismatch {
        /// Configured receiver id
        expected: String,
        /// Receiver id found in the envelope
        actual: String,
    },

    /// Record could not be (de)serialized
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl From<base64::DecodeError> for CipherError {
    fn from(e: base64::DecodeError) -> Self {
        CipherError::Base64(e.to_string())
    }
}
