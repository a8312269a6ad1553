//! Gateway wire protocol
//!
//! Defines the frame envelope and the handshake payload types exchanged
//! with the gateway control plane.

pub mod schema;
pub mod types;

pub use schema::{
    EventFrame, GatewayFrame, RequestFrame, ResponseFrame,
    PROTOCOL_MAX, PROTOCOL_MIN,
};

pub use types::{
    AuthParams, ChallengePayload, ClientDescriptor, ConnectParams, DeviceAuth, HelloOk, events,
};
