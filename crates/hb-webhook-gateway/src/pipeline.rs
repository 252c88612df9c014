//! Inbound callback pipeline.
//!
//! ```text
//! rate limit → verify signature → decrypt envelope → parse XML
//!            → parse command → lookup recipe → notify requester
//! ```
//!
//! Every stage can end the request. Whatever happens, `handle` returns a
//! terminal [`PipelineOutcome`] and never an error: the router maps the
//! outcome to the platform acknowledgement.
//!
//! The router uses [`WebhookPipeline::accept`], which answers once the
//! message is authenticated and decrypted and leaves lookup and notify to a
//! background task. The platform only waits for the acknowledgement.

use crate::crypto::{PlatformCipher, SignatureVerifier};
use crate::domain::command::{CommandGrammar, ParsedCommand};
use crate::domain::config::GatewayConfig;
use crate::domain::error::{GatewayError, WebhookError, WebhookResult};
use crate::domain::types::{ClientKey, DecryptedMessage, EncryptedEnvelope, Recipe, WebhookQuery};
use crate::middleware::metrics::{RequestTimer, WebhookMetrics};
use crate::middleware::rate_limit::{rate_limit_response, SlidingWindowLimiter};
use crate::ports::outbound::{Notifier, RecipeLookup};
use axum::{
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// One inbound callback as seen by the pipeline
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub client_key: ClientKey,
    pub query: WebhookQuery,
    pub body: Bytes,
}

/// Why an authenticated message was not acted on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Event or media message
    NotText,
    /// Text that does not mention the bot
    NotAddressed,
    /// Mentions the bot without a known directive
    Unrecognized,
}

/// Collaborator stage that failed after the message was accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lookup,
    Notify,
}

/// Terminal result of one callback
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Stopped by rate limit, signature or payload checks
    Rejected(WebhookError),
    /// Authentic message handed to a background dispatch
    Accepted,
    /// Authentic message that needs no action
    Ignored(IgnoreReason),
    /// Recipe sent to the requester
    Dispatched {
        recipient: String,
        recipe_title: String,
        /// Placeholder recipe used because lookup found nothing
        fallback: bool,
    },
    /// Command accepted but a collaborator failed; logged, not retried
    Failed { stage: Stage, reason: String },
}

impl PipelineOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            PipelineOutcome::Rejected(e) => e.status(),
            _ => StatusCode::OK,
        }
    }
}

impl IntoResponse for PipelineOutcome {
    fn into_response(self) -> Response {
        match self {
            PipelineOutcome::Rejected(WebhookError::RateLimited) => rate_limit_response(),
            PipelineOutcome::Rejected(WebhookError::Unauthorized) => (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "status": "error", "detail": "Invalid signature" })),
            )
                .into_response(),
            _ => acknowledge(),
        }
    }
}

fn acknowledge() -> Response {
    (StatusCode::OK, Json(serde_json::json!({ "status": "success" }))).into_response()
}

/// The callback pipeline and its collaborators.
pub struct WebhookPipeline {
    limiter: Arc<SlidingWindowLimiter>,
    verifier: SignatureVerifier,
    cipher: PlatformCipher,
    grammar: CommandGrammar,
    lookup: Arc<dyn RecipeLookup>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<WebhookMetrics>,
}

impl WebhookPipeline {
    pub fn new(
        config: &GatewayConfig,
        limiter: Arc<SlidingWindowLimiter>,
        lookup: Arc<dyn RecipeLookup>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<WebhookMetrics>,
    ) -> Result<Self, GatewayError> {
        let cipher = PlatformCipher::new(
            &config.wecom.encoding_aes_key,
            config.wecom.receiver_id.clone(),
        )
        .map_err(|e| GatewayError::Config(e.to_string()))?;

        Ok(Self {
            limiter,
            verifier: SignatureVerifier::new(config.wecom.token.clone()),
            cipher,
            grammar: config.command.clone(),
            lookup,
            notifier,
            metrics,
        })
    }

    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }

    pub fn metrics(&self) -> &Arc<WebhookMetrics> {
        &self.metrics
    }

    /// Acknowledge now, dispatch later.
    ///
    /// Stages 1-4 run inline so rejections still reach the caller. An
    /// authentic message yields `Accepted` plus the handle of the task
    /// running stages 5-7; dropping the handle detaches it.
    pub fn accept(
        self: &Arc<Self>,
        inbound: InboundMessage,
    ) -> (PipelineOutcome, Option<JoinHandle<PipelineOutcome>>) {
        let timer = RequestTimer::start(Arc::clone(&self.metrics));
        let result = self.authenticate_and_decrypt(&inbound);
        timer.finish();

        match result {
            Ok(message) => {
                let pipeline = Arc::clone(self);
                let dispatch = tokio::spawn(
                    async move { pipeline.dispatch(message).await }
                        .instrument(tracing::Span::current()),
                );
                (PipelineOutcome::Accepted, Some(dispatch))
            }
            Err(e) => {
                self.record_rejection(&e);
                (PipelineOutcome::Rejected(e), None)
            }
        }
    }

    /// Run one callback through every stage, awaiting the collaborators.
    pub async fn handle(&self, inbound: InboundMessage) -> PipelineOutcome {
        let timer = RequestTimer::start(Arc::clone(&self.metrics));
        let outcome = match self.authenticate_and_decrypt(&inbound) {
            Ok(message) => self.dispatch(message).await,
            Err(e) => {
                self.record_rejection(&e);
                PipelineOutcome::Rejected(e)
            }
        };
        timer.finish();
        outcome
    }

    /// URL verification handshake: return the decrypted `echostr`.
    pub fn verify_url(&self, client_key: &str, query: &WebhookQuery) -> WebhookResult<String> {
        let result = self.limiter.check(client_key).and_then(|()| {
            self.check_signature(client_key, query)?;
            let echostr = query.echostr.as_deref().ok_or_else(|| {
                WebhookError::MalformedMessage("missing echostr".to_string())
            })?;
            Ok(self.cipher.decrypt(echostr)?.message)
        });

        if let Err(e) = &result {
            self.record_rejection(e);
        } else {
            info!(client = %client_key, "Callback URL verified");
        }
        result
    }

    /// Stages 1-4: everything that can reject the request.
    fn authenticate_and_decrypt(&self, inbound: &InboundMessage) -> WebhookResult<DecryptedMessage> {
        self.limiter.check(&inbound.client_key)?;
        self.check_signature(&inbound.client_key, &inbound.query)?;

        let body = std::str::from_utf8(&inbound.body)
            .map_err(|_| WebhookError::MalformedMessage("body is not UTF-8".to_string()))?;
        let envelope = EncryptedEnvelope::from_xml(body)?;
        let plain = self.cipher.decrypt(&envelope.encrypt)?;

        DecryptedMessage::from_xml(&plain.message)
    }

    fn check_signature(&self, client_key: &str, query: &WebhookQuery) -> WebhookResult<()> {
        let (Some(signature), Some(timestamp), Some(nonce)) = (
            query.msg_signature.as_deref(),
            query.timestamp.as_deref(),
            query.nonce.as_deref(),
        ) else {
            warn!(client = %client_key, "Callback without signature parameters");
            return Err(WebhookError::Unauthorized);
        };

        if !self.verifier.verify(timestamp, nonce, signature) {
            warn!(
                client = %client_key,
                timestamp,
                nonce,
                "Signature mismatch, possible forged callback"
            );
            return Err(WebhookError::Unauthorized);
        }
        Ok(())
    }

    /// Stages 5-7: act on an authenticated message.
    async fn dispatch(&self, message: DecryptedMessage) -> PipelineOutcome {
        if !message.is_text() {
            debug!(msg_type = %message.msg_type, "Ignoring non-text message");
            return self.ignore(IgnoreReason::NotText);
        }

        let content = message.content.as_deref().unwrap_or_default();
        if !self.grammar.is_addressed(content) {
            return self.ignore(IgnoreReason::NotAddressed);
        }

        let (requester, included, excluded) = match self.grammar.parse(&message.from_user, content) {
            ParsedCommand::RecipeRequest {
                requester,
                included,
                excluded,
            } => (requester, included, excluded),
            ParsedCommand::Unrecognized => {
                debug!(from = %message.from_user, "Unrecognized command");
                return self.ignore(IgnoreReason::Unrecognized);
            }
        };

        info!(
            requester = %requester,
            included = ?included,
            excluded = ?excluded,
            "Recipe request"
        );

        let (recipe, fallback) = match self.lookup.find(&included, &excluded).await {
            Ok(Some(recipe)) => (recipe, false),
            Ok(None) => (Recipe::placeholder(&included), true),
            Err(e) => {
                warn!(requester = %requester, error = %e, "Recipe lookup failed");
                self.metrics.record_lookup_failure();
                return PipelineOutcome::Failed {
                    stage: Stage::Lookup,
                    reason: e.to_string(),
                };
            }
        };

        self.notify(requester, recipe, fallback).await
    }

    async fn notify(&self, requester: String, recipe: Recipe, fallback: bool) -> PipelineOutcome {
        match self.notifier.send(&requester, &recipe).await {
            Ok(()) => {
                info!(requester = %requester, recipe = %recipe.title, fallback, "Recipe sent");
                self.metrics.record_dispatched(fallback);
                PipelineOutcome::Dispatched {
                    recipient: requester,
                    recipe_title: recipe.title,
                    fallback,
                }
            }
            Err(e) => {
                warn!(requester = %requester, error = %e, "Failed to send recipe");
                self.metrics.record_notify_failure();
                PipelineOutcome::Failed {
                    stage: Stage::Notify,
                    reason: e.to_string(),
                }
            }
        }
    }

    fn ignore(&self, reason: IgnoreReason) -> PipelineOutcome {
        self.metrics.record_ignored();
        PipelineOutcome::Ignored(reason)
    }

    fn record_rejection(&self, error: &WebhookError) {
        match error {
            WebhookError::RateLimited => self.metrics.record_rate_limited(),
            WebhookError::Unauthorized => self.metrics.record_unauthorized(),
            WebhookError::DecryptionFailed(reason) => {
                warn!(reason = %reason, "Failed to decrypt callback");
                self.metrics.record_decrypt_failed();
            }
            WebhookError::MalformedMessage(reason) => {
                warn!(reason = %reason, "Malformed callback");
                self.metrics.record_malformed();
            }
        }
    }
}
