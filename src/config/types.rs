//! Configuration types
//!
//! Caller-supplied connection parameters. A `GatewayConfig` is immutable
//! for the lifetime of a client and outlives reconnect cycles.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::identity::DeviceIdentity;

/// Gateway link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway endpoint; must resolve to a loopback address
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bearer token presented during the handshake
    #[serde(skip_serializing, default)]
    pub token: Option<SecretString>,

    /// Device identity used to sign the handshake payload
    ///
    /// Key material never round-trips through config files; the caller
    /// loads or generates it and sets it here.
    #[serde(skip)]
    pub device: Option<DeviceIdentity>,

    /// Client descriptor fields
    #[serde(default)]
    pub client: ClientConfig,

    /// Timeout knobs
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Reconnection policy
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            endpoint: default_endpoint(),
            token: None,
            device: None,
            client: ClientConfig::default(),
            timeouts: TimeoutConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

fn default_endpoint() -> String {
    "ws://127.0.0.1:18789".to_string()
}

/// Client descriptor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Stable client id
    #[serde(default = "default_client_id")]
    pub id: String,
    /// Client mode
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Display name shown by the gateway
    #[serde(default = "default_display_name")]
    pub display_name: String,
    /// Requested role
    #[serde(default = "default_role")]
    pub role: String,
    /// Requested scopes
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// BCP 47 locale tag
    #[serde(default = "default_locale")]
    pub locale: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            id: default_client_id(),
            mode: default_mode(),
            display_name: default_display_name(),
            role: default_role(),
            scopes: default_scopes(),
            locale: default_locale(),
        }
    }
}

fn default_client_id() -> String {
    "paw-desktop".to_string()
}

fn default_mode() -> String {
    "ui".to_string()
}

fn default_display_name() -> String {
    "Paw".to_string()
}

fn default_role() -> String {
    "operator".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["chat".to_string(), "sessions".to_string(), "channels".to_string()]
}

fn default_locale() -> String {
    "en-US".to_string()
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Transport open timeout
    #[serde(default = "default_open", with = "humantime_serde")]
    pub open: Duration,
    /// Default per-request timeout
    #[serde(default = "default_request", with = "humantime_serde")]
    pub request: Duration,
    /// How long to wait for an optional challenge before proceeding
    /// without one
    #[serde(default = "default_challenge_window", with = "humantime_serde")]
    pub challenge_window: Duration,
    /// Keepalive request interval
    #[serde(default = "default_keepalive", with = "humantime_serde")]
    pub keepalive_interval: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            open: default_open(),
            request: default_request(),
            challenge_window: default_challenge_window(),
            keepalive_interval: default_keepalive(),
        }
    }
}

fn default_open() -> Duration {
    Duration::from_secs(10)
}

fn default_request() -> Duration {
    Duration::from_secs(30)
}

fn default_challenge_window() -> Duration {
    Duration::from_millis(300)
}

fn default_keepalive() -> Duration {
    Duration::from_secs(30)
}

/// Reconnection policy configuration
///
/// Delay for attempt k is `base_delay * 2^(k-1)`, capped at `max_delay`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// First-attempt delay
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,
    /// Delay cap
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
    /// Consecutive failed attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_base_delay() -> Duration {
    Duration::from_millis(3000)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_max_attempts() -> u32 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = GatewayConfig::default();
        assert_eq!(config.endpoint, "ws://127.0.0.1:18789");
        assert_eq!(config.reconnect.base_delay, Duration::from_millis(3000));
        assert_eq!(config.reconnect.max_attempts, 10);
        assert_eq!(config.timeouts.challenge_window, Duration::from_millis(300));
    }

    #[test]
    fn test_config_deserializes_durations() {
        let config: GatewayConfig = serde_json::from_str(
            r#"{
                "endpoint": "ws://localhost:9100",
                "timeouts": {"open": "5s", "request": "10s"},
                "reconnect": {"base_delay": "1s", "max_delay": "8s", "max_attempts": 3}
            }"#,
        )
        .unwrap();
        assert_eq!(config.endpoint, "ws://localhost:9100");
        assert_eq!(config.timeouts.open, Duration::from_secs(5));
        assert_eq!(config.timeouts.keepalive_interval, Duration::from_secs(30));
        assert_eq!(config.reconnect.max_attempts, 3);
    }

    #[test]
    fn test_token_never_serializes() {
        let config = GatewayConfig {
            token: Some(SecretString::from("super-secret")),
            ..GatewayConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret"));
    }
}
