//! Domain types for the Webhook Gateway.
//!
//! Configuration, error taxonomy, wire types and the command grammar.

pub mod command;
pub mod config;
pub mod correlation;
pub mod error;
pub mod format;
pub mod types;

// Re-exports for convenience
pub use command::{CommandGrammar, ParsedCommand};
pub use config::{GatewayConfig, RateLimitConfig};
pub use correlation::CorrelationId;
pub use error::{GatewayError, WebhookError, WebhookResult};
pub use format::format_recipe_message;
pub use types::*;
