//! Outbound ports for the Webhook Gateway.
//!
//! The gateway owns none of these; recipe storage and the platform's send
//! endpoint live behind traits so the pipeline can be driven with fakes.

use crate::domain::types::Recipe;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Time source for the rate limiter.
pub trait ClockSource: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// System time implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            // Clock before Unix epoch - return 0 rather than panic
            .unwrap_or(0)
    }
}

/// Recipe lookup failure
#[derive(Debug, Clone, thiserror::Error)]
#[error("recipe lookup failed: {0}")]
pub struct LookupError(pub String);

/// Outbound notification failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    /// Could not obtain a platform access token
    #[error("access token unavailable: {0}")]
    Token(String),
    /// Transport-level failure talking to the platform
    #[error("transport error: {0}")]
    Transport(String),
    /// Platform answered with a non-zero error code
    #[error("platform rejected message: [{code}] {message}")]
    Rejected { code: i64, message: String },
}

/// Recipe persistence collaborator.
///
/// A match must contain every ingredient in `include` and carry none of the
/// tags in `exclude`.
#[async_trait]
pub trait RecipeLookup: Send + Sync {
    async fn find(
        &self,
        include: &BTreeSet<String>,
        exclude: &BTreeSet<String>,
    ) -> Result<Option<Recipe>, LookupError>;
}

/// Outbound notification collaborator (platform `message/send`).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, recipe: &Recipe) -> Result<(), NotifyError>;
}
