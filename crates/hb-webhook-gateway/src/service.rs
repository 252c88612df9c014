//! Webhook Gateway service - HTTP entry point.
//!
//! Routes:
//! - `POST /wechat/webhook` encrypted callbacks, acknowledged by [`WebhookPipeline::accept`]
//! - `GET  /wechat/webhook` callback URL verification (`echostr`)
//! - `GET  /health`, `GET /metrics`

use crate::domain::config::GatewayConfig;
use crate::domain::error::{GatewayError, WebhookError};
use crate::domain::types::WebhookQuery;
use crate::middleware::{
    cleanup_task, rate_limit_response, resolve_client_key, RateLimitLayer, SlidingWindowLimiter,
    TracingLayer, WebhookMetrics,
};
use crate::pipeline::{InboundMessage, PipelineOutcome, WebhookPipeline};
use crate::ports::outbound::{Notifier, RecipeLookup};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

/// Webhook path registered with the platform
pub const WEBHOOK_PATH: &str = "/wechat/webhook";

/// Webhook Gateway service
pub struct WebhookService {
    config: GatewayConfig,
    pipeline: Arc<WebhookPipeline>,
}

impl WebhookService {
    /// Validate config and wire the pipeline to its collaborators.
    pub fn new(
        config: GatewayConfig,
        lookup: Arc<dyn RecipeLookup>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, GatewayError> {
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let limiter = Arc::new(SlidingWindowLimiter::new(config.rate_limit.clone()));
        let metrics = Arc::new(WebhookMetrics::new());
        let pipeline = Arc::new(WebhookPipeline::new(
            &config, limiter, lookup, notifier, metrics,
        )?);

        Ok(Self { config, pipeline })
    }

    pub fn metrics(&self) -> Arc<WebhookMetrics> {
        Arc::clone(self.pipeline.metrics())
    }

    pub fn limiter(&self) -> Arc<SlidingWindowLimiter> {
        Arc::clone(self.pipeline.limiter())
    }

    /// Build the router with its middleware stack.
    pub fn router(&self) -> Router {
        let state = AppState {
            pipeline: Arc::clone(&self.pipeline),
            trust_proxy_headers: self.config.http.trust_proxy_headers,
        };

        // The webhook route rate-limits inside the pipeline
        let auxiliary = Router::new()
            .route("/health", get(health_check))
            .route("/metrics", get(metrics_snapshot))
            .layer(RateLimitLayer::new(
                self.limiter(),
                self.config.http.trust_proxy_headers,
            ));

        Router::new()
            .route(WEBHOOK_PATH, post(handle_callback).get(handle_url_verification))
            .merge(auxiliary)
            .layer(RequestBodyLimitLayer::new(self.config.http.max_body_bytes))
            .layer(TimeoutLayer::new(self.config.http.request_timeout))
            .layer(TracingLayer::new())
            .with_state(state)
    }

    /// Serve until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.http_addr();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Bind(format!("{}: {}", addr, e)))?;

        let cleanup = tokio::spawn(cleanup_task(
            self.limiter(),
            self.config.rate_limit.cleanup_interval,
        ));

        info!(
            addr = %addr,
            window_secs = self.config.rate_limit.window.as_secs(),
            max_requests = self.config.rate_limit.max_requests,
            "Webhook gateway listening"
        );

        let result = axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| GatewayError::Serve(e.to_string()));

        cleanup.abort();
        info!("Webhook gateway stopped");
        result
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    pipeline: Arc<WebhookPipeline>,
    trust_proxy_headers: bool,
}

impl AppState {
    fn client_key(&self, headers: &HeaderMap, peer: Option<ConnectInfo<SocketAddr>>) -> String {
        resolve_client_key(headers, peer.map(|c| c.0), self.trust_proxy_headers)
    }
}

async fn handle_callback(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> PipelineOutcome {
    let inbound = InboundMessage {
        client_key: state.client_key(&headers, peer),
        query,
        body,
    };
    // Lookup and notify outlive the response; the platform only needs the ack
    let (outcome, _dispatch) = state.pipeline.accept(inbound);
    outcome
}

async fn handle_url_verification(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(query): Query<WebhookQuery>,
) -> Response {
    let client_key = state.client_key(&headers, peer);
    match state.pipeline.verify_url(&client_key, &query) {
        Ok(echo) => (StatusCode::OK, echo).into_response(),
        Err(WebhookError::RateLimited) => rate_limit_response(),
        Err(e @ WebhookError::Unauthorized) => PipelineOutcome::Rejected(e).into_response(),
        // The platform expects the plaintext back, so an acknowledgement would be wrong here
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "status": "error", "detail": e.kind() })),
        )
            .into_response(),
    }
}

async fn metrics_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    let tracked = state.pipeline.limiter().tracked_clients();
    Json(state.pipeline.metrics().to_json(tracked))
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "hb-webhook-gateway",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
