//! Callback signature verification.
//!
//! `sha1_hex(sort([token, timestamp, nonce]).concat())`, compared in constant
//! time. SHA-1 is fixed by the platform protocol.

use sha1::{Digest, Sha1};

/// Compute the expected signature for a callback.
pub fn compute_signature(token: &str, timestamp: &str, nonce: &str) -> String {
    let mut parts = [token, timestamp, nonce];
    parts.sort_unstable();

    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Check a provided signature against the one computed from the inputs.
pub fn verify(token: &str, timestamp: &str, nonce: &str, signature: &str) -> bool {
    constant_time_compare(&compute_signature(token, timestamp, nonce), signature)
}

/// Verifier bound to the configured shared token.
#[derive(Clone)]
pub struct SignatureVerifier {
    token: String,
}

impl SignatureVerifier {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn verify(&self, timestamp: &str, nonce: &str, signature: &str) -> bool {
        verify(&self.token, timestamp, nonce, signature)
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Constant-time string comparison to prevent timing attacks
///
/// SECURITY: This function takes the same amount of time regardless of how
/// many characters match. Lengths are compared in constant time as well.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;

    let max_len = std::cmp::max(a.len(), b.len());

    // Different pad values ensure mismatch if lengths differ
    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];

    a_padded[..a.len()].copy_from_slice(a.as_bytes());
    b_padded[..b.len()].copy_from_slice(b.as_bytes());

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.ct_eq(&b_padded);

    (lengths_equal & contents_equal).into()
}
