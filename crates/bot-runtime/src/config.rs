//! # Runtime Configuration
//!
//! Everything is read from the environment once at startup.
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `TOKEN` | Callback signature token |
//! | `ENCODING_AES_KEY` | 43-char callback encryption key |
//! | `CORP_ID` | Corp id (envelope receiver id, `gettoken` corpid) |
//! | `AGENT_ID` | Application agent id for `message/send` |
//! | `SECRET` | Application secret for `gettoken` |
//! | `HB_BIND_ADDR` | Listen address, default `0.0.0.0:8000` |
//! | `HB_RATE_LIMIT_WINDOW_SECS` | Limiter window, default 60 |
//! | `HB_RATE_LIMIT_MAX` | Requests per window, default 100 |
//! | `HB_TRUST_PROXY_HEADERS` | `true` to key clients by `X-Forwarded-For` |
//! | `HB_RECIPES_PATH` | JSON recipe book, empty book when unset |
//! | `HB_TRIGGER` | Bot mention, default `@HealthBot` |
//! | `HB_GRAMMAR` | `chinese` selects the Chinese command markers |
//! | `HB_WECOM_API_BASE` | WeCom API base URL |
//!
//! Unparseable optional values are logged and left at their defaults.
//! Missing credentials are errors.

use hb_webhook_gateway::{CommandGrammar, GatewayConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Default WeCom API endpoint
pub const DEFAULT_WECOM_API_BASE: &str = "https://qyapi.weixin.qq.com/cgi-bin";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeConfigError {
    /// Required variable not set or empty
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    /// Required variable has the wrong shape
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Credentials for the outbound message API.
#[derive(Clone)]
pub struct WeComApiConfig {
    pub api_base: String,
    pub corp_id: String,
    pub corp_secret: String,
    pub agent_id: i64,
}

impl std::fmt::Debug for WeComApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeComApiConfig")
            .field("api_base", &self.api_base)
            .field("corp_id", &self.corp_id)
            .field("corp_secret", &"<redacted>")
            .field("agent_id", &self.agent_id)
            .finish()
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Gateway (inbound) configuration
    pub gateway: GatewayConfig,
    /// WeCom API (outbound) configuration
    pub wecom_api: WeComApiConfig,
    /// Recipe book location
    pub recipes_path: Option<PathBuf>,
}

impl RuntimeConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, RuntimeConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RuntimeConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(RuntimeConfigError::Missing(key));

        let mut gateway = GatewayConfig::default();
        gateway.wecom.token = require("TOKEN")?;
        gateway.wecom.encoding_aes_key = require("ENCODING_AES_KEY")?;

        let corp_id = require("CORP_ID")?;
        gateway.wecom.receiver_id = Some(corp_id.clone());

        let agent_id = require("AGENT_ID")?;
        let agent_id = agent_id
            .trim()
            .parse::<i64>()
            .map_err(|e| RuntimeConfigError::Invalid {
                var: "AGENT_ID",
                reason: e.to_string(),
            })?;

        let wecom_api = WeComApiConfig {
            api_base: get("HB_WECOM_API_BASE")
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_WECOM_API_BASE.to_string()),
            corp_id,
            corp_secret: require("SECRET")?,
            agent_id,
        };

        if let Some(addr) = parsed::<SocketAddr>(get("HB_BIND_ADDR"), "HB_BIND_ADDR") {
            gateway.http.host = addr.ip();
            gateway.http.port = addr.port();
        }
        if let Some(secs) = parsed::<u64>(get("HB_RATE_LIMIT_WINDOW_SECS"), "HB_RATE_LIMIT_WINDOW_SECS") {
            gateway.rate_limit.window = Duration::from_secs(secs);
            if gateway.rate_limit.idle_retention < gateway.rate_limit.window {
                gateway.rate_limit.idle_retention = gateway.rate_limit.window;
            }
        }
        if let Some(max) = parsed::<u32>(get("HB_RATE_LIMIT_MAX"), "HB_RATE_LIMIT_MAX") {
            gateway.rate_limit.max_requests = max;
        }
        if let Some(trust) = parsed::<bool>(get("HB_TRUST_PROXY_HEADERS"), "HB_TRUST_PROXY_HEADERS") {
            gateway.http.trust_proxy_headers = trust;
        }

        if get("HB_GRAMMAR").is_some_and(|g| g.eq_ignore_ascii_case("chinese")) {
            gateway.command = CommandGrammar::chinese();
        }
        if let Some(trigger) = get("HB_TRIGGER") {
            gateway.command.trigger = trigger.trim().to_string();
        }

        Ok(Self {
            gateway,
            wecom_api,
            recipes_path: get("HB_RECIPES_PATH").map(PathBuf::from),
        })
    }
}

fn parsed<T>(value: Option<String>, var: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value = value?;
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(var, value = %value, error = %e, "Ignoring invalid configuration value");
            None
        }
    }
}
