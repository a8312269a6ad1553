//! Handshake negotiator
//!
//! Runs once per successful transport open. Listens briefly for an
//! optional server challenge, builds the authentication payload, and
//! sends the single `connect` negotiation request. The challenge window
//! is deliberately short and fixed: deployments that skip challenge
//! issuance must not stall connecting, so a challenge arriving after the
//! window closes is ignored and the client authenticates without a
//! nonce.

use secrecy::ExposeSecret;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::dispatch::RequestDispatcher;
use crate::error::{Error, Result};
use crate::events::EventSubscription;
use crate::protocol::{
    AuthParams, ChallengePayload, ClientDescriptor, ConnectParams, HelloOk, PROTOCOL_MAX,
    PROTOCOL_MIN,
};
use crate::transport::TransportSession;

/// Handshake progression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    Idle,
    AwaitingChallenge,
    BuildingAuth,
    AwaitingResult,
    Authenticated,
    Rejected,
}

/// Run the handshake on a freshly opened session
///
/// `challenge` must be subscribed before the session's frame pump
/// starts, so a challenge the gateway sends the instant the socket
/// opens is buffered rather than dropped. Success yields the negotiated
/// capability summary. Any failure is fatal to this connection attempt;
/// the caller closes the session and decides whether to reconnect.
pub async fn negotiate(
    config: &GatewayConfig,
    session: &TransportSession,
    dispatcher: &RequestDispatcher,
    challenge: EventSubscription,
) -> Result<HelloOk> {
    let mut phase = HandshakePhase::Idle;
    debug!(session = session.id(), ?phase, "handshake starting");

    phase = HandshakePhase::AwaitingChallenge;
    debug!(?phase, window = ?config.timeouts.challenge_window, "listening for challenge");
    let nonce = await_challenge(challenge, config.timeouts.challenge_window).await;

    phase = HandshakePhase::BuildingAuth;
    debug!(?phase, has_nonce = nonce.is_some(), "building auth payload");
    let params = build_connect_params(config, nonce.as_deref());

    phase = HandshakePhase::AwaitingResult;
    debug!(?phase, "sending connect request");
    let outcome = dispatcher
        .request(
            session,
            "connect",
            serde_json::to_value(&params)?,
            config.timeouts.request,
        )
        .await;

    match outcome {
        Ok(payload) => {
            let hello: HelloOk = serde_json::from_value(payload)
                .map_err(|err| Error::HandshakeRejected(format!("malformed result: {}", err)))?;
            phase = HandshakePhase::Authenticated;
            info!(
                ?phase,
                protocol = hello.protocol,
                caps = hello.caps.len(),
                "handshake complete"
            );
            Ok(hello)
        }
        Err(Error::Remote(message)) => {
            phase = HandshakePhase::Rejected;
            warn!(?phase, %message, "gateway rejected handshake");
            Err(Error::HandshakeRejected(message))
        }
        Err(Error::RequestTimeout { .. }) => {
            phase = HandshakePhase::Rejected;
            warn!(?phase, "no handshake result within timeout");
            Err(Error::HandshakeTimeout(config.timeouts.request))
        }
        Err(err) => Err(err),
    }
}

/// Wait the bounded window for an optional challenge event
///
/// Returns its nonce, or `None` when the window elapses or the payload
/// is unusable. A slow gateway whose challenge lands just after the
/// window authenticates without a nonce; that is the documented
/// behavior, not a bug to fix here.
async fn await_challenge(mut subscription: EventSubscription, window: Duration) -> Option<String> {
    match timeout(window, subscription.recv()).await {
        Ok(Some(envelope)) => {
            match serde_json::from_value::<ChallengePayload>(envelope.payload) {
                Ok(challenge) => {
                    debug!("challenge received");
                    Some(challenge.nonce)
                }
                Err(err) => {
                    warn!(error = %err, "unusable challenge payload, proceeding without nonce");
                    None
                }
            }
        }
        Ok(None) => None,
        Err(_) => {
            debug!(window_ms = window.as_millis() as u64, "no challenge within window");
            None
        }
    }
}

fn build_connect_params(config: &GatewayConfig, nonce: Option<&str>) -> ConnectParams {
    let token = config
        .token
        .as_ref()
        .map(|token| token.expose_secret().to_string());

    let device = config.device.as_ref().map(|identity| {
        identity.authorize(
            &config.client.id,
            &config.client.mode,
            &config.client.role,
            &config.client.scopes,
            token.as_deref(),
            nonce,
            chrono::Utc::now().timestamp_millis(),
        )
    });

    ConnectParams {
        min_protocol: PROTOCOL_MIN,
        max_protocol: PROTOCOL_MAX,
        client: ClientDescriptor {
            id: config.client.id.clone(),
            version: crate::VERSION.to_string(),
            platform: std::env::consts::OS.to_string(),
            mode: config.client.mode.clone(),
            display_name: config.client.display_name.clone(),
        },
        role: config.client.role.clone(),
        scopes: config.client.scopes.clone(),
        caps: vec!["events".to_string(), "keepalive".to_string()],
        commands: Vec::new(),
        auth: token.map(|token| AuthParams { token }),
        device,
        locale: config.client.locale.clone(),
        user_agent: format!("{}/{}", crate::NAME, crate::VERSION),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventRouter;
    use crate::identity::DeviceIdentity;
    use crate::protocol::types::events;
    use secrecy::SecretString;

    #[test]
    fn test_connect_params_without_device() {
        let config = GatewayConfig {
            token: Some(SecretString::from("tok-1")),
            ..GatewayConfig::default()
        };
        let params = build_connect_params(&config, None);

        assert_eq!(params.min_protocol, PROTOCOL_MIN);
        assert_eq!(params.max_protocol, PROTOCOL_MAX);
        assert_eq!(params.auth.as_ref().unwrap().token, "tok-1");
        assert!(params.device.is_none());
        assert!(params.user_agent.starts_with("pawlink/"));
    }

    #[test]
    fn test_connect_params_signs_nonce_when_present() {
        let config = GatewayConfig {
            device: Some(DeviceIdentity::generate()),
            ..GatewayConfig::default()
        };

        let with_nonce = build_connect_params(&config, Some("n-42"));
        let device = with_nonce.device.unwrap();
        assert_eq!(device.nonce.as_deref(), Some("n-42"));
        assert!(!device.signature.is_empty());

        let without_nonce = build_connect_params(&config, None);
        assert!(without_nonce.device.unwrap().nonce.is_none());
    }

    #[tokio::test]
    async fn test_challenge_window_elapses_without_challenge() {
        let router = EventRouter::new();
        let subscription = router.subscribe(events::CONNECT_CHALLENGE).await;
        let nonce = await_challenge(subscription, Duration::from_millis(20)).await;
        assert!(nonce.is_none());
    }

    #[tokio::test]
    async fn test_challenge_nonce_extracted() {
        let router = std::sync::Arc::new(EventRouter::new());
        let subscription = router.subscribe(events::CONNECT_CHALLENGE).await;
        {
            let router = router.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                router.dispatch(challenge_frame("n-7")).await;
            });
        }

        let nonce = await_challenge(subscription, Duration::from_millis(500)).await;
        assert_eq!(nonce.as_deref(), Some("n-7"));
    }

    #[tokio::test]
    async fn test_challenge_dispatched_before_wait_is_still_seen() {
        // The subscription exists before the wait begins, so a challenge
        // routed in the meantime is buffered, not lost
        let router = EventRouter::new();
        let subscription = router.subscribe(events::CONNECT_CHALLENGE).await;

        router.dispatch(challenge_frame("n-early")).await;

        let nonce = await_challenge(subscription, Duration::from_millis(50)).await;
        assert_eq!(nonce.as_deref(), Some("n-early"));
    }

    fn challenge_frame(nonce: &str) -> crate::protocol::EventFrame {
        crate::protocol::EventFrame {
            event: events::CONNECT_CHALLENGE.to_string(),
            payload: serde_json::json!({ "nonce": nonce }),
            seq: None,
        }
    }
}
