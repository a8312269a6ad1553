//! pawlink - persistent gateway link for the Paw desktop client
//!
//! Maintains a single long-lived WebSocket connection to a local
//! gateway process: authenticated handshake with optional device
//! signing, request/response correlation over the multiplexed link,
//! server-push event demultiplexing with sequence-gap detection,
//! periodic keepalive, and bounded exponential-backoff reconnection.
//!
//! # Quick start
//!
//! ```no_run
//! use pawlink::{GatewayClient, GatewayConfig};
//!
//! # async fn run() -> pawlink::Result<()> {
//! let client = GatewayClient::new(GatewayConfig::default())?;
//! client.connect().await?;
//!
//! let mut messages = client.subscribe("message.received").await;
//! while let Some(event) = messages.recv().await {
//!     println!("{}", event.payload);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod handshake;
pub mod identity;
pub mod keepalive;
pub mod protocol;
pub mod transport;

pub use client::{ConnectionState, GatewayClient, LifecycleEvent};
pub use config::{GatewayConfig, ReconnectConfig, TimeoutConfig};
pub use error::{Error, Result};
pub use events::{EventEnvelope, EventSubscription};
pub use identity::DeviceIdentity;
pub use protocol::HelloOk;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
