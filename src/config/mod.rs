//! Configuration module
//!
//! Connection parameters for one gateway link:
//! - types.rs: configuration types (GatewayConfig, timeouts, reconnect policy)
//! - validation.rs: endpoint validation, including the loopback-only check

mod types;
mod validation;

pub use types::{ClientConfig, GatewayConfig, ReconnectConfig, TimeoutConfig};
pub use validation::{ensure_local_endpoint, validate_config, ConfigValidationResult, ValidationIssue};
