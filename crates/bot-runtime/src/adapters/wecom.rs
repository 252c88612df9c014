//! WeCom message API notifier.
//!
//! Implements the gateway's `Notifier` port: obtains an access token from
//! `gettoken` (cached until shortly before `expires_in`), then posts a text
//! message to `message/send`.

use crate::config::WeComApiConfig;
use async_trait::async_trait;
use hb_webhook_gateway::{format_recipe_message, Notifier, NotifyError, Recipe};
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Tokens are refreshed this long before the platform expires them
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Error codes meaning the cached token is no longer valid
const TOKEN_INVALID_CODES: [i64; 3] = [40014, 42001, 41001];

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
    access_token: Option<String>,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

#[derive(Debug, Serialize)]
struct TextContent<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    touser: &'a str,
    msgtype: &'static str,
    agentid: i64,
    text: TextContent<'a>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Sends recipes to users through the WeCom application.
pub struct WeComNotifier {
    client: Client,
    config: WeComApiConfig,
    token: Mutex<Option<CachedToken>>,
}

impl WeComNotifier {
    pub fn new(config: WeComApiConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            config,
            token: Mutex::new(None),
        })
    }

    /// Current access token, fetched when absent or near expiry.
    pub async fn access_token(&self) -> Result<String, NotifyError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let url = format!("{}/gettoken", self.config.api_base);
        let response: TokenResponse = self
            .client
            .get(&url)
            .query(&[
                ("corpid", self.config.corp_id.as_str()),
                ("corpsecret", self.config.corp_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| NotifyError::Token(format!("unreadable gettoken response: {}", e)))?;

        if response.errcode != 0 {
            return Err(NotifyError::Token(format!(
                "[{}] {}",
                response.errcode, response.errmsg
            )));
        }
        let value = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| NotifyError::Token("gettoken returned no access_token".into()))?;

        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        *self.token.lock() = Some(CachedToken {
            value: value.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        info!(expires_in = response.expires_in, "Fetched WeCom access token");

        Ok(value)
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self.token.lock();
        guard
            .as_ref()
            .filter(|t| Instant::now() < t.refresh_at)
            .map(|t| t.value.clone())
    }

    fn invalidate_token(&self) {
        *self.token.lock() = None;
    }

    /// Post a plain text message to one user.
    pub async fn send_text(&self, recipient: &str, content: &str) -> Result<(), NotifyError> {
        let token = self.access_token().await?;
        let url = format!("{}/message/send", self.config.api_base);
        let message = TextMessage {
            touser: recipient,
            msgtype: "text",
            agentid: self.config.agent_id,
            text: TextContent { content },
        };

        let response: SendResponse = self
            .client
            .post(&url)
            .query(&[("access_token", token.as_str())])
            .json(&message)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| NotifyError::Transport(format!("unreadable send response: {}", e)))?;

        if response.errcode != 0 {
            if TOKEN_INVALID_CODES.contains(&response.errcode) {
                warn!(errcode = response.errcode, "Access token rejected, dropping cache");
                self.invalidate_token();
            }
            return Err(NotifyError::Rejected {
                code: response.errcode,
                message: response.errmsg,
            });
        }

        debug!(recipient, "Message delivered");
        Ok(())
    }
}

#[async_trait]
impl Notifier for WeComNotifier {
    async fn send(&self, recipient: &str, recipe: &Recipe) -> Result<(), NotifyError> {
        self.send_text(recipient, &format_recipe_message(recipe)).await
    }
}
