//! Gateway handshake and method types
//!
//! Typed payloads for the `connect` negotiation and the convenience
//! methods the facade wraps.

use serde::{Deserialize, Serialize};

// ============================================================================
// Handshake
// ============================================================================

/// Parameters of the `connect` negotiation request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// Lowest protocol version the client accepts
    pub min_protocol: u32,
    /// Highest protocol version the client accepts
    pub max_protocol: u32,
    /// Client descriptor
    pub client: ClientDescriptor,
    /// Requested role
    pub role: String,
    /// Requested scopes
    pub scopes: Vec<String>,
    /// Client capabilities
    #[serde(default)]
    pub caps: Vec<String>,
    /// Client-exposed commands
    #[serde(default)]
    pub commands: Vec<String>,
    /// Bearer token auth
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthParams>,
    /// Signed device identity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceAuth>,
    /// Client locale
    pub locale: String,
    /// User-agent string
    pub user_agent: String,
}

/// Client descriptor sent during negotiation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDescriptor {
    /// Client id (stable per installation)
    pub id: String,
    /// Client version
    pub version: String,
    /// Platform tag
    pub platform: String,
    /// Client mode
    pub mode: String,
    /// Human-readable name
    pub display_name: String,
}

/// Bearer token auth parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthParams {
    /// Bearer token
    pub token: String,
}

/// Signed device identity parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAuth {
    /// Device id (derived from the public key)
    pub id: String,
    /// Base64-encoded Ed25519 public key
    pub public_key: String,
    /// Base64-encoded signature over the canonical payload
    pub signature: String,
    /// Signing timestamp, milliseconds since the epoch
    pub signed_at: i64,
    /// Challenge nonce, present when the gateway issued one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Negotiation result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloOk {
    /// Negotiated protocol version
    pub protocol: u32,
    /// Capabilities the gateway granted
    #[serde(default)]
    pub caps: Vec<String>,
    /// Gateway build identifier, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

/// Payload of the optional server-initiated challenge event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengePayload {
    /// Short-lived nonce binding the auth signature to this session
    pub nonce: String,
}

// ============================================================================
// Methods
// ============================================================================

/// Send message to agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSendRequest {
    /// Session id (optional, the gateway creates one if absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Message content
    pub message: String,
    /// Enable streaming
    #[serde(default)]
    pub stream: bool,
}

/// Agent response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    /// Session id
    pub session_id: String,
    /// Response content
    pub content: String,
    /// Model used
    #[serde(default)]
    pub model: Option<String>,
}

/// Session info
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Session id
    pub id: String,
    /// Channel id
    pub channel_id: Option<String>,
    /// Current model
    #[serde(default)]
    pub model: Option<String>,
    /// Last activity timestamp
    #[serde(default)]
    pub last_activity_at: Option<i64>,
}

/// List sessions response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsListResponse {
    /// Sessions
    pub sessions: Vec<SessionInfo>,
}

/// Channel status
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatus {
    /// Channel id
    pub id: String,
    /// Channel label
    pub label: String,
    /// Whether running
    pub running: bool,
    /// Last error
    #[serde(default)]
    pub last_error: Option<String>,
}

/// List channels response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsListResponse {
    /// Channels
    pub channels: Vec<ChannelStatus>,
}

// ============================================================================
// Events
// ============================================================================

/// Event names
pub mod events {
    /// Server-issued auth challenge, sent right after the socket opens
    pub const CONNECT_CHALLENGE: &str = "connect.challenge";
    /// Message received on a channel
    pub const MESSAGE_RECEIVED: &str = "message.received";
    /// Streaming chunk
    pub const STREAM_CHUNK: &str = "stream.chunk";
    /// Session state changed
    pub const SESSION_UPDATED: &str = "session.updated";
    /// Channel status changed
    pub const CHANNEL_STATUS: &str = "channel.status";
    /// Advisory diagnostic: a gap was observed in the event sequence
    pub const LINK_GAP: &str = "link.gap";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_params_field_names() {
        let params = ConnectParams {
            min_protocol: 1,
            max_protocol: 2,
            client: ClientDescriptor {
                id: "paw-desktop".into(),
                version: "0.1.0".into(),
                platform: "linux".into(),
                mode: "ui".into(),
                display_name: "Paw".into(),
            },
            role: "operator".into(),
            scopes: vec!["chat".into(), "admin".into()],
            caps: vec![],
            commands: vec![],
            auth: Some(AuthParams {
                token: "tok".into(),
            }),
            device: None,
            locale: "en-US".into(),
            user_agent: "pawlink/0.1.0".into(),
        };

        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("minProtocol"));
        assert!(json.contains("maxProtocol"));
        assert!(json.contains("displayName"));
        assert!(json.contains("userAgent"));
        assert!(!json.contains("device"));
    }

    #[test]
    fn test_device_auth_omits_missing_nonce() {
        let device = DeviceAuth {
            id: "ab12".into(),
            public_key: "cGs=".into(),
            signature: "c2ln".into(),
            signed_at: 1_700_000_000_000,
            nonce: None,
        };
        let json = serde_json::to_string(&device).unwrap();
        assert!(json.contains("signedAt"));
        assert!(!json.contains("nonce"));
    }

    #[test]
    fn test_hello_ok_defaults() {
        let hello: HelloOk = serde_json::from_str(r#"{"protocol":2}"#).unwrap();
        assert_eq!(hello.protocol, 2);
        assert!(hello.caps.is_empty());
        assert!(hello.server.is_none());
    }
}
