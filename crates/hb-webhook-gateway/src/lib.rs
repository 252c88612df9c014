// Allow missing docs for internal items in development
#![allow(missing_docs)]

//! Health-Bot Webhook Gateway - authenticated, encrypted WeCom callback
//! ingestion behind a per-client rate limiter.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                      WEBHOOK GATEWAY                              │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  POST /wechat/webhook    GET /wechat/webhook    /health /metrics  │
//! │          │                      │                     │           │
//! │  ┌───────┴──────────────────────┴─────────────────────┴────────┐  │
//! │  │        Tracing → Timeout → BodyLimit (→ RateLimit aux)      │  │
//! │  └───────┬──────────────────────┬──────────────────────────────┘  │
//! │          │                      │                                 │
//! │  ┌───────┴──────────────────────┴───────┐                         │
//! │  │            WebhookPipeline           │                         │
//! │  │  SlidingWindowLimiter (DashMap)      │                         │
//! │  │  SignatureVerifier (SHA-1, sorted)   │                         │
//! │  │  PlatformCipher (AES-256-CBC)        │                         │
//! │  │  CommandGrammar                      │                         │
//! │  └───────┬──────────────────────────────┘                         │
//! └──────────┼────────────────────────────────────────────────────────┘
//!            │
//!     ┌──────┴──────┐
//!     ▼             ▼
//! RecipeLookup   Notifier        (outbound ports)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use hb_webhook_gateway::{GatewayConfig, InMemoryRecipeBook, WebhookService};
//!
//! let service = WebhookService::new(config, Arc::new(book), notifier)?;
//! service.start(shutdown_signal()).await?;
//! ```
//!
//! # Security
//!
//! - Signature checked in constant time before any decryption
//! - Receiver (corp) id checked on every decrypted envelope when configured
//! - Per-client sliding-window limit, enforced before signature checks
//! - Request body size limit and whole-request timeout

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod crypto;
pub mod domain;
pub mod middleware;
pub mod pipeline;
pub mod ports;
pub mod service;

// Re-exports for public API
pub use adapters::InMemoryRecipeBook;
pub use domain::config::{GatewayConfig, RateLimitConfig};
pub use domain::error::{GatewayError, WebhookError};
pub use domain::types::*;
pub use domain::{format_recipe_message, CommandGrammar, ParsedCommand};
pub use middleware::{SlidingWindowLimiter, WebhookMetrics};
pub use pipeline::{InboundMessage, PipelineOutcome, WebhookPipeline};
pub use ports::outbound::{LookupError, Notifier, NotifyError, RecipeLookup};
pub use service::WebhookService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
