//! Webhook counters, exported as JSON on `/metrics`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Gateway counters. All monotonic except the latency totals.
#[derive(Debug, Default)]
pub struct WebhookMetrics {
    pub requests_total: AtomicU64,
    pub rate_limited: AtomicU64,
    pub unauthorized: AtomicU64,
    pub decrypt_failed: AtomicU64,
    pub malformed: AtomicU64,
    pub ignored: AtomicU64,
    pub dispatched: AtomicU64,
    pub fallback_recipes: AtomicU64,
    pub lookup_failures: AtomicU64,
    pub notify_failures: AtomicU64,

    // Simplified latency tracking
    pub total_latency_ms: AtomicU64,
    pub request_count_for_latency: AtomicU64,
}

impl WebhookMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unauthorized(&self) {
        self.unauthorized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decrypt_failed(&self) {
        self.decrypt_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a recipe sent to a user; `fallback` marks a placeholder recipe.
    pub fn record_dispatched(&self, fallback: bool) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        if fallback {
            self.fallback_recipes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_lookup_failure(&self) {
        self.lookup_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notify_failure(&self) {
        self.notify_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, latency_ms: u64) {
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.request_count_for_latency
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Get average latency in ms
    pub fn average_latency_ms(&self) -> f64 {
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        let count = self.request_count_for_latency.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    /// Export counters as JSON. `tracked_clients` comes from the limiter.
    pub fn to_json(&self, tracked_clients: usize) -> serde_json::Value {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        serde_json::json!({
            "requests": {
                "total": load(&self.requests_total),
                "rate_limited": load(&self.rate_limited),
                "unauthorized": load(&self.unauthorized),
                "decrypt_failed": load(&self.decrypt_failed),
                "malformed": load(&self.malformed),
                "ignored": load(&self.ignored),
            },
            "recipes": {
                "dispatched": load(&self.dispatched),
                "fallback": load(&self.fallback_recipes),
                "lookup_failures": load(&self.lookup_failures),
                "notify_failures": load(&self.notify_failures),
            },
            "rate_limiting": {
                "tracked_clients": tracked_clients,
            },
            "latency": {
                "average_ms": self.average_latency_ms(),
            }
        })
    }
}

/// Request timing helper
pub struct RequestTimer {
    start: Instant,
    metrics: Arc<WebhookMetrics>,
}

impl RequestTimer {
    pub fn start(metrics: Arc<WebhookMetrics>) -> Self {
        metrics.record_request();
        Self {
            start: Instant::now(),
            metrics,
        }
    }

    pub fn finish(self) {
        let latency_ms = self.start.elapsed().as_millis() as u64;
        self.metrics.record_latency(latency_ms);
    }
}
