//! Per-request span carrying a correlation id.
//!
//! The id is taken from an inbound `x-request-id` when it parses as a UUID,
//! minted otherwise, stored in request extensions for handlers, and echoed
//! back on the response.

use crate::domain::correlation::{CorrelationId, REQUEST_ID_HEADER};
use axum::{
    body::Body,
    http::{HeaderValue, Request},
    response::Response,
};
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::{info, info_span, Instrument, Span};

/// Tracing layer that creates spans for each request
#[derive(Clone, Default)]
pub struct TracingLayer;

impl TracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for TracingLayer {
    type Service = TracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracingService { inner }
    }
}

/// Tracing service
#[derive(Clone)]
pub struct TracingService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for TracingService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();

        let correlation_id = CorrelationId::from_header(
            req.headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok()),
        );
        req.extensions_mut().insert(correlation_id);

        let span = info_span!(
            "webhook_request",
            correlation_id = %correlation_id,
            http.method = %req.method(),
            http.target = %req.uri().path(),
            http.status = tracing::field::Empty,
        );

        Box::pin(
            async move {
                let started = Instant::now();
                let mut result = inner.call(req).await;

                if let Ok(response) = &mut result {
                    let status = response.status();
                    Span::current().record("http.status", status.as_u16());
                    if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
                        response.headers_mut().insert(REQUEST_ID_HEADER, value);
                    }
                    info!(
                        status = status.as_u16(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Request completed"
                    );
                }

                result
            }
            .instrument(span),
        )
    }
}
