//! Per-client sliding-window rate limiting.
//!
//! Each client key keeps the timestamps of its admitted requests. A call
//! first drops timestamps older than the window, then admits only if fewer
//! than `max_requests` remain. The filter-check-append sequence for one key
//! runs under that key's DashMap shard lock, so concurrent requests from one
//! client can never overshoot the limit.

use crate::domain::config::RateLimitConfig;
use crate::domain::error::WebhookError;
use crate::domain::types::ClientKey;
use crate::ports::outbound::{ClockSource, SystemClock};
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::{Layer, Service};
use tracing::{debug, warn};

/// Admitted-request log for one client
#[derive(Debug, Default)]
struct ClientLog {
    /// Admission timestamps (ms), insertion order
    hits: VecDeque<u64>,
    /// Last admission (ms), drives idle eviction
    last_seen: u64,
}

/// Sliding-window limiter shared across requests
pub struct SlidingWindowLimiter {
    logs: DashMap<ClientKey, ClientLog>,
    config: RateLimitConfig,
    clock: Arc<dyn ClockSource>,
    /// Last inline purge (ms), spaces them by `cleanup_interval`
    last_purge: AtomicU64,
}

impl SlidingWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn ClockSource>) -> Self {
        Self {
            logs: DashMap::new(),
            config,
            clock,
            last_purge: AtomicU64::new(0),
        }
    }

    fn window_ms(&self) -> u64 {
        self.config.window.as_millis() as u64
    }

    /// Decide admission for `key` at `now_ms`.
    ///
    /// On admission `now_ms` is appended to the key's log; a rejection leaves
    /// the log as filtered and appends nothing.
    pub fn admit(&self, key: &str, now_ms: u64) -> bool {
        if !self.config.enabled {
            return true;
        }

        let window = self.window_ms();
        let limit = self.config.max_requests as usize;

        let admitted = {
            let mut log = self.logs.entry(key.to_owned()).or_insert_with(|| {
                debug!(client = %key, "Tracking new client");
                ClientLog::default()
            });

            // saturating_sub: a timestamp ahead of `now` (clock regression) has age 0
            log.hits.retain(|&t| now_ms.saturating_sub(t) < window);

            if log.hits.len() >= limit {
                false
            } else {
                log.hits.push_back(now_ms);
                log.last_seen = now_ms;
                true
            }
        };

        if admitted && self.logs.len() > self.config.max_tracked_clients {
            self.purge_if_due(now_ms);
        }

        admitted
    }

    /// Admission check against the injected clock.
    pub fn check(&self, key: &str) -> Result<(), WebhookError> {
        if self.admit(key, self.clock.now_millis()) {
            Ok(())
        } else {
            warn!(client = %key, limit = self.config.max_requests, "Rate limit exceeded");
            Err(WebhookError::RateLimited)
        }
    }

    /// Drop clients idle for longer than the configured retention.
    pub fn purge_idle(&self, now_ms: u64) -> usize {
        let retention = self.config.idle_retention.as_millis() as u64;
        let before = self.logs.len();
        self.logs.retain(|key, log| {
            let idle = now_ms.saturating_sub(log.last_seen);
            if idle >= retention {
                debug!(client = %key, idle_ms = idle, "Removing idle client log");
                false
            } else {
                true
            }
        });
        before.saturating_sub(self.logs.len())
    }

    /// Inline purge, at most once per `cleanup_interval`.
    fn purge_if_due(&self, now_ms: u64) {
        let interval = self.config.cleanup_interval.as_millis() as u64;
        let last = self.last_purge.load(Ordering::Relaxed);
        if last != 0 && now_ms.saturating_sub(last) < interval {
            return;
        }
        // Only the thread that wins the swap walks the map
        if self
            .last_purge
            .compare_exchange(last, now_ms.max(1), Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            self.purge_idle(now_ms);
        }
    }

    /// Purge against the injected clock.
    pub fn cleanup(&self) -> usize {
        self.purge_idle(self.clock.now_millis())
    }

    /// Stored timestamps for `key` (empty if untracked).
    pub fn hits(&self, key: &str) -> Vec<u64> {
        self.logs
            .get(key)
            .map(|log| log.hits.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Get number of tracked clients
    pub fn tracked_clients(&self) -> usize {
        self.logs.len()
    }
}

/// Rate limit layer for routes outside the webhook pipeline.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<SlidingWindowLimiter>,
    trust_proxy_headers: bool,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<SlidingWindowLimiter>, trust_proxy_headers: bool) -> Self {
        Self {
            limiter,
            trust_proxy_headers,
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: Arc::clone(&self.limiter),
            trust_proxy_headers: self.trust_proxy_headers,
        }
    }
}

/// Rate limit service
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<SlidingWindowLimiter>,
    trust_proxy_headers: bool,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let limiter = Arc::clone(&self.limiter);
        let mut inner = self.inner.clone();
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|c| c.0);
        let key = resolve_client_key(req.headers(), peer, self.trust_proxy_headers);

        Box::pin(async move {
            match limiter.check(&key) {
                Ok(()) => inner.call(req).await,
                Err(_) => Ok(rate_limit_response()),
            }
        })
    }
}

/// Client key for a request: the peer IP, or the first forwarded IP when
/// proxy headers are trusted.
pub fn resolve_client_key(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> ClientKey {
    if trust_proxy_headers {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());
        let real_ip = || {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
        };
        if let Some(ip) = forwarded.or_else(real_ip) {
            return ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Fixed 429 body
pub fn rate_limit_response() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "status": "error",
            "detail": "Too many requests, please try again later"
        })),
    )
        .into_response()
}

/// Background task to purge idle client logs
pub async fn cleanup_task(limiter: Arc<SlidingWindowLimiter>, interval: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        let removed = limiter.cleanup();
        if removed > 0 {
            debug!(removed, remaining = limiter.tracked_clients(), "Purged idle rate limit logs");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    const SEC: u64 = 1_000;

    fn test_config(max_requests: u32) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            max_requests,
            window: Duration::from_secs(60),
            idle_retention: Duration::from_secs(600),
            cleanup_interval: Duration::from_secs(60),
            max_tracked_clients: 10_000,
        }
    }

    struct ManualClock(AtomicU64);

    impl ClockSource for ManualClock {
        fn now_millis(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_allows_within_limit() {
        let limiter = SlidingWindowLimiter::new(test_config(3));
        assert!(limiter.admit("10.0.0.1", 1_000));
        assert!(limiter.admit("10.0.0.1", 1_001));
        assert!(limiter.admit("10.0.0.1", 1_002));
        assert!(!limiter.admit("10.0.0.1", 1_003));
    }

    #[test]
    fn test_rejection_does_not_mutate_log() {
        let limiter = SlidingWindowLimiter::new(test_config(2));
        assert!(limiter.admit("10.0.0.2", 5 * SEC));
        assert!(limiter.admit("10.0.0.2", 6 * SEC));
        let before = limiter.hits("10.0.0.2");

        assert!(!limiter.admit("10.0.0.2", 7 * SEC));
        assert!(!limiter.admit("10.0.0.2", 8 * SEC));
        assert_eq!(limiter.hits("10.0.0.2"), before);
    }

    #[test]
    fn test_window_slides() {
        let limiter = SlidingWindowLimiter::new(test_config(2));
        assert!(limiter.admit("k", 0));
        assert!(limiter.admit("k", 30 * SEC));
        assert!(!limiter.admit("k", 59 * SEC));
        // First hit is exactly one window old and no longer counts
        assert!(limiter.admit("k", 60 * SEC));
        assert_eq!(limiter.hits("k"), vec![30 * SEC, 60 * SEC]);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = SlidingWindowLimiter::new(test_config(1));
        assert!(limiter.admit("a", 0));
        assert!(!limiter.admit("a", 1));
        assert!(limiter.admit("b", 1));
    }

    #[test]
    fn test_clock_regression_does_not_evict() {
        let limiter = SlidingWindowLimiter::new(test_config(2));
        assert!(limiter.admit("k", 100 * SEC));
        assert!(limiter.admit("k", 101 * SEC));
        // Clock steps back far enough that `now - t` would be negative
        assert!(!limiter.admit("k", 10 * SEC));
        assert_eq!(limiter.hits("k").len(), 2);
    }

    #[test]
    fn test_disabled_rate_limiting() {
        let mut config = test_config(1);
        config.enabled = false;
        let limiter = SlidingWindowLimiter::new(config);
        for i in 0..100 {
            assert!(limiter.admit("k", i));
        }
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_check_uses_clock() {
        let clock = Arc::new(ManualClock(AtomicU64::new(0)));
        let limiter = SlidingWindowLimiter::with_clock(test_config(1), clock.clone());
        assert!(limiter.check("k").is_ok());
        assert_eq!(limiter.check("k"), Err(WebhookError::RateLimited));

        clock.0.store(61 * SEC, Ordering::SeqCst);
        assert!(limiter.check("k").is_ok());
    }

    #[test]
    fn test_purge_idle_removes_stale_clients() {
        let limiter = SlidingWindowLimiter::new(test_config(5));
        assert!(limiter.admit("old", 0));
        assert!(limiter.admit("fresh", 590 * SEC));
        assert_eq!(limiter.tracked_clients(), 2);

        assert_eq!(limiter.purge_idle(600 * SEC), 1);
        assert_eq!(limiter.tracked_clients(), 1);
        assert!(limiter.hits("old").is_empty());
        assert_eq!(limiter.hits("fresh"), vec![590 * SEC]);
    }

    #[test]
    fn test_soft_cap_triggers_inline_purge() {
        let mut config = test_config(5);
        config.max_tracked_clients = 2;
        let limiter = SlidingWindowLimiter::new(config);
        assert!(limiter.admit("a", 0));
        assert!(limiter.admit("b", 0));
        // Third client pushes past the cap; a and b are idle by then
        assert!(limiter.admit("c", 700 * SEC));
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_inline_purge_spaced_by_cleanup_interval() {
        let mut config = test_config(5);
        config.max_tracked_clients = 2;
        config.idle_retention = Duration::from_secs(60);
        config.cleanup_interval = Duration::from_secs(120);
        let limiter = SlidingWindowLimiter::new(config);

        assert!(limiter.admit("a", 0));
        assert!(limiter.admit("b", 0));
        assert!(limiter.admit("c", 100 * SEC));
        assert_eq!(limiter.tracked_clients(), 1);

        // Over the cap again, but the last purge was only 80s ago
        assert!(limiter.admit("d", 170 * SEC));
        assert!(limiter.admit("e", 180 * SEC));
        assert_eq!(limiter.tracked_clients(), 3);

        assert!(limiter.admit("f", 230 * SEC));
        assert_eq!(limiter.tracked_clients(), 2);
        assert!(limiter.hits("c").is_empty());
        assert!(limiter.hits("d").is_empty());
    }

    #[test]
    fn test_concurrent_admission_never_overshoots() {
        let limiter = Arc::new(SlidingWindowLimiter::new(test_config(50)));
        let admitted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if limiter.admit("shared", 1_000) {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 50);
        assert_eq!(limiter.hits("shared").len(), 50);
    }

    #[test]
    fn test_resolve_client_key() {
        let peer: SocketAddr = "192.168.1.7:51000".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());

        assert_eq!(resolve_client_key(&headers, Some(peer), false), "192.168.1.7");
        assert_eq!(resolve_client_key(&headers, Some(peer), true), "203.0.113.9");

        let mut real = HeaderMap::new();
        real.insert("x-real-ip", "198.51.100.4".parse().unwrap());
        assert_eq!(resolve_client_key(&real, None, true), "198.51.100.4");
        assert_eq!(resolve_client_key(&HeaderMap::new(), None, true), "unknown");
    }

    proptest! {
        /// No 60s window ever contains more admissions than the limit.
        #[test]
        fn prop_window_never_exceeds_limit(
            limit in 1u32..8,
            gaps in proptest::collection::vec(0u64..20_000, 1..200),
        ) {
            let limiter = SlidingWindowLimiter::new(test_config(limit));
            let mut now = 0u64;
            let mut admitted = Vec::new();
            for gap in gaps {
                now += gap;
                if limiter.admit("k", now) {
                    admitted.push(now);
                }
            }

            for (i, &start) in admitted.iter().enumerate() {
                let in_window = admitted[i..]
                    .iter()
                    .take_while(|&&t| t < start + 60 * SEC)
                    .count();
                prop_assert!(in_window <= limit as usize);
            }
        }
    }
}
