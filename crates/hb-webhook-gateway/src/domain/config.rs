//! Gateway configuration with validation.
//!
//! Read once at startup and immutable afterwards.

use crate::domain::command::CommandGrammar;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Length of the platform's EncodingAESKey (base64 without the trailing `=`)
pub const ENCODING_AES_KEY_LEN: usize = 43;

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server configuration
    pub http: HttpConfig,
    /// Platform callback credentials
    pub wecom: WeComConfig,
    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
    /// Command grammar markers
    pub command: CommandGrammar,
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wecom.token.is_empty() {
            return Err(ConfigError::MissingSecret("token"));
        }

        if self.wecom.encoding_aes_key.len() != ENCODING_AES_KEY_LEN {
            return Err(ConfigError::InvalidKey(format!(
                "encoding_aes_key must be {} characters, got {}",
                ENCODING_AES_KEY_LEN,
                self.wecom.encoding_aes_key.len()
            )));
        }

        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "max_requests cannot be 0".into(),
            ));
        }

        if self.rate_limit.window.is_zero() {
            return Err(ConfigError::InvalidRateLimit("window cannot be 0".into()));
        }

        if self.rate_limit.idle_retention < self.rate_limit.window {
            return Err(ConfigError::InvalidRateLimit(
                "idle_retention must be at least one window".into(),
            ));
        }

        if self.command.trigger.trim().is_empty() || self.command.keyword.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "command trigger and keyword cannot be empty".into(),
            ));
        }

        if self.http.request_timeout.is_zero() {
            return Err(ConfigError::Invalid("request_timeout cannot be 0".into()));
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 8000)
    pub port: u16,
    /// Deadline for a whole request, pipeline included
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Max request body size in bytes
    pub max_body_bytes: usize,
    /// Take the client address from X-Forwarded-For / X-Real-IP
    pub trust_proxy_headers: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8000,
            request_timeout: Duration::from_secs(5),
            max_body_bytes: 64 * 1024,
            trust_proxy_headers: false,
        }
    }
}

/// Platform callback credentials
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WeComConfig {
    /// Shared token used for callback signatures
    pub token: String,
    /// 43-character EncodingAESKey
    pub encoding_aes_key: String,
    /// Corp id expected as the envelope's receiver id (None = not checked)
    pub receiver_id: Option<String>,
}

impl fmt::Debug for WeComConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeComConfig")
            .field("token", &"<redacted>")
            .field("encoding_aes_key", &"<redacted>")
            .field("receiver_id", &self.receiver_id)
            .finish()
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Requests admitted per client within one window
    pub max_requests: u32,
    /// Sliding window length
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Idle time after which a client's log is dropped
    #[serde(with = "humantime_serde")]
    pub idle_retention: Duration,
    /// Interval of the background purge
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    /// Tracked-client count that triggers an inline purge
    pub max_tracked_clients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window: Duration::from_secs(60),
            idle_retention: Duration::from_secs(600),
            cleanup_interval: Duration::from_secs(60),
            max_tracked_clients: 10_000,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Required secret not provided
    #[error("missing secret: {0}")]
    MissingSecret(&'static str),
    /// Key material has the wrong shape
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// Invalid rate limiting configuration
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            // Try parsing as plain seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.wecom.token = "QDG6eK".into();
        config.wecom.encoding_aes_key = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG".into();
        config
    }

    #[test]
    fn test_default_config_requires_secrets() {
        let config = GatewayConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSecret("token"))
        ));
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_defaults_match_limiter_contract() {
        let config = GatewayConfig::default();
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.window, Duration::from_secs(60));
        assert_eq!(config.http_addr().port(), 8000);
    }

    #[test]
    fn test_short_aes_key_rejected() {
        let mut config = valid_config();
        config.wecom.encoding_aes_key = "tooshort".into();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidKey(_))));
    }

    #[test]
    fn test_rate_limit_validation() {
        let mut config = valid_config();
        config.rate_limit.max_requests = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRateLimit(_))
        ));

        let mut config = valid_config();
        config.rate_limit.idle_retention = Duration::from_secs(10);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRateLimit(_))
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", valid_config().wecom);
        assert!(!rendered.contains("QDG6eK"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_parse_duration_units() {
        use humantime_serde::parse_duration;
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("60s"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("10m"), Ok(Duration::from_secs(600)));
        assert_eq!(parse_duration("30"), Ok(Duration::from_secs(30)));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "wecom": { "token": "t", "encoding_aes_key": "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG" },
            "rate_limit": { "max_requests": 5, "window": "10s", "idle_retention": "1m" }
        }"#;
        let config: GatewayConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.rate_limit.window, Duration::from_secs(10));
        assert_eq!(config.http.port, 8000);
        assert!(config.validate().is_ok());
    }
}
