//! Webhook Gateway error types.
//!
//! `WebhookError` is the per-request taxonomy absorbed by the pipeline;
//! `GatewayError` covers server-level faults.

use crate::crypto::CipherError;
use axum::http::StatusCode;

/// Per-request rejection reasons.
///
/// None of these reach the platform as a fault: the pipeline turns each one
/// into a terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WebhookError {
    /// Sliding window for this client is full
    #[error("rate limit exceeded")]
    RateLimited,

    /// Signature missing or mismatched
    #[error("signature verification failed")]
    Unauthorized,

    /// Ciphertext could not be decoded, decrypted or unpadded
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Envelope or decrypted message is not the expected XML
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

impl WebhookError {
    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookError::RateLimited => "rate_limited",
            WebhookError::Unauthorized => "unauthorized",
            WebhookError::DecryptionFailed(_) => "decryption_failed",
            WebhookError::MalformedMessage(_) => "malformed_message",
        }
    }

    /// HTTP status reported to the platform.
    ///
    /// Payload errors still acknowledge with 200 so the platform does not
    /// retry a message that can never be processed.
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            WebhookError::Unauthorized => StatusCode::UNAUTHORIZED,
            WebhookError::DecryptionFailed(_) | WebhookError::MalformedMessage(_) => StatusCode::OK,
        }
    }
}

impl From<CipherError> for WebhookError {
    fn from(e: CipherError) -> Self {
        WebhookError::DecryptionFailed(e.to_string())
    }
}

/// Result type for pipeline stages
pub type WebhookResult<T> = Result<T, WebhookError>;

/// Gateway-level errors (not per request)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// HTTP server terminated with an error
    #[error("server error: {0}")]
    Serve(String),
}
