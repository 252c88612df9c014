//! Middleware for the webhook router.
//!
//! Layer order: Request → Tracing → Timeout → BodyLimit → RateLimit → Handler
//!
//! The webhook route itself is rate limited inside the pipeline (it must
//! reject before verifying), so `RateLimitLayer` only wraps the auxiliary
//! routes. Both share one `SlidingWindowLimiter`.

pub mod metrics;
pub mod rate_limit;
pub mod tracing;

pub use metrics::{RequestTimer, WebhookMetrics};
pub use rate_limit::{
    cleanup_task, rate_limit_response, resolve_client_key, RateLimitLayer, SlidingWindowLimiter,
};
pub use tracing::TracingLayer;
