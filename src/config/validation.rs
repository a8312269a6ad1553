//! Configuration validation
//!
//! Validates a gateway configuration and reports issues. The endpoint
//! loopback check is the one hard gate: sending the bearer token to a
//! non-local host is a security failure, not a connectivity one.

use std::net::IpAddr;
use url::{Host, Url};

use super::types::GatewayConfig;
use crate::error::{Error, Result};

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Parse the endpoint and enforce the loopback-only rule
///
/// Returns the parsed URL, or `SecurityRejected` before any socket is
/// opened when the host is not local.
pub fn ensure_local_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint)?;

    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(Error::Config(format!(
                "Endpoint must use ws:// or wss://, got {}://",
                other
            )))
        }
    }

    let local = match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
        None => false,
    };

    if !local {
        return Err(Error::SecurityRejected(format!(
            "Endpoint {} is not a loopback address; refusing to send credentials to it",
            endpoint
        )));
    }

    Ok(url)
}

/// Validate the configuration
pub fn validate_config(config: &GatewayConfig) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    if let Err(err) = ensure_local_endpoint(&config.endpoint) {
        result = result.with_error(
            ValidationIssue::new("endpoint", err.to_string())
                .with_suggestion("Use ws://127.0.0.1:<port> or ws://localhost:<port>"),
        );
    }

    if config.token.is_none() && config.device.is_none() {
        result = result.with_warning(
            ValidationIssue::new(
                "token",
                "No bearer token or device identity configured; the gateway may reject the handshake",
            )
            .with_suggestion("Set a token or configure a device identity"),
        );
    }

    if config.client.id.is_empty() {
        result = result.with_error(ValidationIssue::new("client.id", "Client id must not be empty"));
    }

    if config.reconnect.max_attempts == 0 {
        result = result.with_warning(
            ValidationIssue::new(
                "reconnect.max_attempts",
                "Zero reconnect attempts disables automatic recovery",
            )
            .with_suggestion("Use at least 1, or rely on manual connect()"),
        );
    }

    if config.reconnect.base_delay > config.reconnect.max_delay {
        result = result.with_error(ValidationIssue::new(
            "reconnect.base_delay",
            "Base delay exceeds the delay cap",
        ));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_endpoints_accepted() {
        for endpoint in [
            "ws://127.0.0.1:18789",
            "ws://localhost:18789",
            "ws://[::1]:18789",
            "wss://127.0.0.1:443/gateway",
        ] {
            assert!(ensure_local_endpoint(endpoint).is_ok(), "{}", endpoint);
        }
    }

    #[test]
    fn test_remote_endpoints_rejected() {
        for endpoint in [
            "ws://example.com:18789",
            "ws://10.0.0.5:18789",
            "ws://192.168.1.4:18789",
            "wss://gateway.paw.dev",
        ] {
            match ensure_local_endpoint(endpoint) {
                Err(Error::SecurityRejected(_)) => {}
                other => panic!("{} should be security-rejected, got {:?}", endpoint, other),
            }
        }
    }

    #[test]
    fn test_non_ws_scheme_rejected() {
        match ensure_local_endpoint("http://127.0.0.1:18789") {
            Err(Error::Config(_)) => {}
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_config_reports_paths() {
        let config = GatewayConfig {
            endpoint: "ws://example.com:1".to_string(),
            ..GatewayConfig::default()
        };
        let report = validate_config(&config);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|issue| issue.path == "endpoint"));
        // No token and no device configured in the default
        assert!(report.warnings.iter().any(|issue| issue.path == "token"));
    }
}
