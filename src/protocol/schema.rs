//! Gateway frame schema
//!
//! Defines the wire format for gateway messages: JSON objects, one per
//! WebSocket text message, discriminated by a `type` tag.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lowest protocol version this client speaks
pub const PROTOCOL_MIN: u32 = 1;

/// Highest protocol version this client speaks
pub const PROTOCOL_MAX: u32 = 2;

/// Gateway frame - top-level message envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GatewayFrame {
    /// Request from client
    Req(RequestFrame),
    /// Response from server
    Res(ResponseFrame),
    /// Event pushed by server
    Event(EventFrame),
}

/// Request frame
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFrame {
    /// Correlation id, unique among in-flight requests
    pub id: String,
    /// Method name
    pub method: String,
    /// Parameters (opaque to the link)
    #[serde(default)]
    pub params: Value,
}

/// Response frame
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseFrame {
    /// Correlation id of the request this answers
    pub id: String,
    /// Whether the request succeeded
    pub ok: bool,
    /// Result payload (success)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Error payload (failure); the gateway sends either an object or a
    /// bare string here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// Event frame
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFrame {
    /// Event name
    pub event: String,
    /// Event payload
    #[serde(default)]
    pub payload: Value,
    /// Monotonically increasing server sequence number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl GatewayFrame {
    /// Build a request frame
    pub fn request(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        GatewayFrame::Req(RequestFrame {
            id: id.into(),
            method: method.into(),
            params,
        })
    }
}

impl ResponseFrame {
    /// Render the error payload as a human-readable message
    ///
    /// The gateway reports failures either as a bare string or as an
    /// object with a `message` field; anything else is rendered as JSON.
    pub fn error_message(&self) -> String {
        match &self.error {
            Some(Value::String(message)) => message.clone(),
            Some(Value::Object(fields)) => fields
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(fields.clone()).to_string()),
            Some(other) => other.to_string(),
            None => "unspecified gateway error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_frame_serialization() {
        let frame = GatewayFrame::request("7", "agent.send", json!({"message": "hello"}));

        let text = serde_json::to_string(&frame).unwrap();
        assert!(text.contains(r#""type":"req""#));
        assert!(text.contains(r#""id":"7""#));
        assert!(text.contains("agent.send"));
    }

    #[test]
    fn test_response_frame_shapes() {
        let ok: GatewayFrame =
            serde_json::from_str(r#"{"type":"res","id":"1","ok":true,"payload":{"n":1}}"#).unwrap();
        match ok {
            GatewayFrame::Res(res) => {
                assert!(res.ok);
                assert_eq!(res.payload.unwrap()["n"], 1);
            }
            other => panic!("expected response frame, got {:?}", other),
        }

        let failed: GatewayFrame =
            serde_json::from_str(r#"{"type":"res","id":"2","ok":false,"error":"no such method"}"#)
                .unwrap();
        match failed {
            GatewayFrame::Res(res) => {
                assert!(!res.ok);
                assert_eq!(res.error_message(), "no such method");
            }
            other => panic!("expected response frame, got {:?}", other),
        }
    }

    #[test]
    fn test_error_object_message() {
        let res = ResponseFrame {
            id: "3".into(),
            ok: false,
            payload: None,
            error: Some(json!({"code": -32601, "message": "method not found"})),
        };
        assert_eq!(res.error_message(), "method not found");
    }

    #[test]
    fn test_event_frame_with_and_without_seq() {
        let with_seq: GatewayFrame = serde_json::from_str(
            r#"{"type":"event","event":"message.received","payload":{"text":"hi"},"seq":42}"#,
        )
        .unwrap();
        match with_seq {
            GatewayFrame::Event(event) => {
                assert_eq!(event.event, "message.received");
                assert_eq!(event.seq, Some(42));
            }
            other => panic!("expected event frame, got {:?}", other),
        }

        let without_seq: GatewayFrame =
            serde_json::from_str(r#"{"type":"event","event":"channel.status","payload":{}}"#)
                .unwrap();
        match without_seq {
            GatewayFrame::Event(event) => assert_eq!(event.seq, None),
            other => panic!("expected event frame, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_tag_is_rejected() {
        let parsed: std::result::Result<GatewayFrame, _> =
            serde_json::from_str(r#"{"type":"hug","id":"1"}"#);
        assert!(parsed.is_err());
    }
}
