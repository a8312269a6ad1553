//! Error types for pawlink

use thiserror::Error;

/// Result type alias using pawlink's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pawlink
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Endpoint failed the local-address check; raised before any
    /// network activity and never retried automatically
    #[error("Security rejected: {0}")]
    SecurityRejected(String),

    /// Transport could not be opened within the open-timeout
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Gateway rejected the handshake
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    /// No handshake result arrived within the request timeout
    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(std::time::Duration),

    /// No session is open
    #[error("Not connected to gateway")]
    NotConnected,

    /// No response arrived within the per-request timeout
    #[error("Request timed out: {method} (id {id})")]
    RequestTimeout { method: String, id: u64 },

    /// Server-reported failure, surfaced verbatim
    #[error("Gateway error: {0}")]
    Remote(String),

    /// Synthetic error failing every outstanding request when the
    /// session drops
    #[error("Disconnected from gateway")]
    Disconnected,

    /// Automatic reconnection gave up after the configured attempt cap;
    /// requests fail with this until a manual connect succeeds
    #[error("Reconnect attempts exhausted after {0} tries")]
    ReconnectExhausted(u32),

    /// WebSocket-level error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if the facade's backoff policy should retry after this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectFailed(_)
                | Error::HandshakeRejected(_)
                | Error::HandshakeTimeout(_)
                | Error::WebSocket(_)
                | Error::Disconnected
        )
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Config(format!("Invalid endpoint URL: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(Error::ConnectFailed("refused".into()).is_retryable());
        assert!(Error::Disconnected.is_retryable());
        assert!(!Error::SecurityRejected("remote host".into()).is_retryable());
        assert!(!Error::NotConnected.is_retryable());
        assert!(!Error::Remote("bad params".into()).is_retryable());
        assert!(!Error::ReconnectExhausted(10).is_retryable());
    }
}
