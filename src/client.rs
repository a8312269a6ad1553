//! Gateway facade
//!
//! `GatewayClient` composes the transport, handshake, dispatcher, event
//! router, and keepalive into one stateful object owned by its caller.
//! It is explicitly constructed — no singleton — so independent
//! instances are safe to create in tests, and it owns the reconnection
//! policy: bounded exponential backoff driven by an explicit state
//! machine rather than a chain of retry callbacks.

use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ensure_local_endpoint, validate_config, ConfigValidationResult, GatewayConfig, ReconnectConfig};
use crate::dispatch::RequestDispatcher;
use crate::error::{Error, Result};
use crate::events::{EventEnvelope, EventRouter, EventSubscription};
use crate::handshake;
use crate::keepalive::KeepaliveMonitor;
use crate::protocol::types::{
    events, AgentResponse, AgentSendRequest, ChannelStatus, ChannelsListResponse, SessionInfo,
    SessionsListResponse,
};
use crate::protocol::{GatewayFrame, HelloOk};
use crate::transport::{SessionEvent, TransportSession};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session; no connect in progress
    Disconnected,
    /// Transport opening
    Connecting,
    /// Transport open, handshake running
    Handshaking,
    /// Handshake complete; requests accepted
    Connected,
    /// Automatic reconnection gave up; manual connect still possible
    Exhausted,
}

/// Notifications for the embedding application's connection indicator
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// Handshake completed
    Connected,
    /// Session dropped
    Disconnected { reason: String },
    /// Automatic reconnection gave up
    ReconnectExhausted,
}

/// Reconnect attempt counter and delay schedule
///
/// Delay for attempt k is `base * 2^(k-1)`, capped; reset to zero only
/// after a handshake succeeds.
struct ReconnectState {
    attempts: u32,
}

impl ReconnectState {
    fn new() -> Self {
        ReconnectState { attempts: 0 }
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before the next attempt, or `None` once attempts are spent
    fn next_delay(&mut self, policy: &ReconnectConfig) -> Option<Duration> {
        if self.attempts >= policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        let factor = 1u32.checked_shl(self.attempts - 1).unwrap_or(u32::MAX);
        let delay = policy
            .base_delay
            .checked_mul(factor)
            .unwrap_or(policy.max_delay);
        Some(delay.min(policy.max_delay))
    }
}

struct ClientInner {
    config: GatewayConfig,
    endpoint: Url,
    state: Mutex<ConnectionState>,
    session: Mutex<Option<Arc<TransportSession>>>,
    dispatcher: Arc<RequestDispatcher>,
    router: Arc<EventRouter>,
    keepalive: KeepaliveMonitor,
    reconnect: Mutex<ReconnectState>,
    lifecycle_tx: broadcast::Sender<LifecycleEvent>,
    /// Bumped whenever the current session is superseded; pumps and
    /// close handlers from an older epoch become inert
    epoch: AtomicU64,
    /// Serializes connect attempts: only one may be in flight
    connect_lock: Mutex<()>,
    /// Armed by `connect()`, disarmed by `disconnect()`, and it stays
    /// disarmed until the next manual connect. A reconnect worker that
    /// wakes up disarmed stops instead of dialing
    auto_reconnect: AtomicBool,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
}

/// Stateful client for one gateway link
pub struct GatewayClient {
    inner: Arc<ClientInner>,
}

impl GatewayClient {
    /// Create a client for the given configuration
    ///
    /// The endpoint is checked here, before any socket exists: a
    /// non-loopback host fails with `SecurityRejected`.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let endpoint = ensure_local_endpoint(&config.endpoint)?;
        let (lifecycle_tx, _) = broadcast::channel(32);

        Ok(GatewayClient {
            inner: Arc::new(ClientInner {
                config,
                endpoint,
                state: Mutex::new(ConnectionState::Disconnected),
                session: Mutex::new(None),
                dispatcher: Arc::new(RequestDispatcher::new()),
                router: Arc::new(EventRouter::new()),
                keepalive: KeepaliveMonitor::new(),
                reconnect: Mutex::new(ReconnectState::new()),
                lifecycle_tx,
                epoch: AtomicU64::new(0),
                connect_lock: Mutex::new(()),
                auto_reconnect: AtomicBool::new(false),
                reconnect_task: Mutex::new(None),
            }),
        })
    }

    /// Validate the configuration without connecting
    pub fn validate(&self) -> ConfigValidationResult {
        validate_config(&self.inner.config)
    }

    /// Current connection state
    pub async fn state(&self) -> ConnectionState {
        *self.inner.state.lock().await
    }

    /// Open a session and run the handshake
    ///
    /// Tears down any previous session first and re-arms automatic
    /// reconnection. An already-scheduled reconnect is aborted, not
    /// queued behind this attempt. Success resets the reconnect attempt
    /// counter.
    pub async fn connect(&self) -> Result<HelloOk> {
        self.inner.auto_reconnect.store(true, Ordering::SeqCst);
        if let Some(task) = self.inner.reconnect_task.lock().await.take() {
            task.abort();
        }
        ClientInner::connect_once(&self.inner).await
    }

    /// Close the session and disarm automatic reconnection
    pub async fn disconnect(&self) {
        self.inner.auto_reconnect.store(false, Ordering::SeqCst);
        if let Some(task) = self.inner.reconnect_task.lock().await.take() {
            task.abort();
        }

        let _guard = self.inner.connect_lock.lock().await;
        self.inner.teardown("disconnect requested").await;
        let was_connected = {
            let mut state = self.inner.state.lock().await;
            let previous = *state;
            *state = ConnectionState::Disconnected;
            previous == ConnectionState::Connected
        };
        if was_connected {
            let _ = self.inner.lifecycle_tx.send(LifecycleEvent::Disconnected {
                reason: "disconnect requested".to_string(),
            });
        }
    }

    /// Issue a request with the default timeout
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.request_with_timeout(method, params, self.inner.config.timeouts.request)
            .await
    }

    /// Issue a request with an explicit timeout
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let session = {
            match *self.inner.state.lock().await {
                ConnectionState::Connected => {}
                ConnectionState::Exhausted => {
                    return Err(Error::ReconnectExhausted(
                        self.inner.config.reconnect.max_attempts,
                    ))
                }
                _ => return Err(Error::NotConnected),
            }
            self.inner
                .session
                .lock()
                .await
                .clone()
                .ok_or(Error::NotConnected)?
        };
        self.inner
            .dispatcher
            .request(&session, method, params, timeout)
            .await
    }

    /// Subscribe to a gateway event by name
    ///
    /// Subscriptions survive reconnects; they belong to the client, not
    /// to any one session.
    pub async fn subscribe(&self, event: &str) -> EventSubscription {
        self.inner.router.subscribe(event).await
    }

    /// Wait for the next occurrence of an event
    pub async fn wait_for(&self, event: &str, timeout: Duration) -> Result<EventEnvelope> {
        self.inner.router.wait_for(event, timeout).await
    }

    /// Subscribe to connection lifecycle notifications
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.lifecycle_tx.subscribe()
    }

    // ========================================================================
    // Typed convenience wrappers
    // ========================================================================

    /// Lightweight liveness check
    pub async fn ping(&self) -> Result<()> {
        self.request("ping", json!({})).await.map(|_| ())
    }

    /// Send a message to the agent
    pub async fn send_agent_message(&self, request: AgentSendRequest) -> Result<AgentResponse> {
        let payload = self
            .request("agent.send", serde_json::to_value(&request)?)
            .await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// List active sessions
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        let payload = self.request("sessions.list", json!({})).await?;
        let response: SessionsListResponse = serde_json::from_value(payload)?;
        Ok(response.sessions)
    }

    /// List channel bridges and their status
    pub async fn list_channels(&self) -> Result<Vec<ChannelStatus>> {
        let payload = self.request("channels.list", json!({})).await?;
        let response: ChannelsListResponse = serde_json::from_value(payload)?;
        Ok(response.channels)
    }
}

impl ClientInner {
    /// One full connect attempt: teardown, open, handshake
    ///
    /// Boxed: the reconnect worker this spawns re-enters the same
    /// future, which would otherwise make the future type infinitely
    /// recursive.
    fn connect_once(inner: &Arc<ClientInner>) -> BoxFuture<'static, Result<HelloOk>> {
        let inner = inner.clone();
        Box::pin(async move {
            let _guard = inner.connect_lock.lock().await;

            ensure_local_endpoint(&inner.config.endpoint)?;
            inner.teardown("superseded by new connect attempt").await;
            *inner.state.lock().await = ConnectionState::Connecting;

            let opened = TransportSession::open(&inner.endpoint, inner.config.timeouts.open).await;
            let (session, events_rx) = match opened {
                Ok(pair) => pair,
                Err(err) => {
                    *inner.state.lock().await = ConnectionState::Disconnected;
                    return Err(err);
                }
            };

            let epoch = inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            *inner.session.lock().await = Some(session.clone());
            inner.router.reset_seq().await;
            // Subscribe before the pump can run: a challenge the gateway
            // sends the moment the socket opens must land in this
            // subscription, not on a router with no subscribers
            let challenge = inner.router.subscribe(events::CONNECT_CHALLENGE).await;
            tokio::spawn(ClientInner::pump(inner.clone(), events_rx, epoch));

            *inner.state.lock().await = ConnectionState::Handshaking;
            match handshake::negotiate(&inner.config, &session, &inner.dispatcher, challenge).await
            {
                Ok(hello) => {
                    *inner.state.lock().await = ConnectionState::Connected;
                    inner.reconnect.lock().await.reset();
                    inner
                        .keepalive
                        .start(
                            session,
                            inner.dispatcher.clone(),
                            inner.config.timeouts.keepalive_interval,
                            inner.config.timeouts.request,
                        )
                        .await;
                    let _ = inner.lifecycle_tx.send(LifecycleEvent::Connected);
                    info!(protocol = hello.protocol, "gateway link established");
                    Ok(hello)
                }
                Err(err) => {
                    warn!(error = %err, "connection attempt failed");
                    inner.teardown("handshake failed").await;
                    *inner.state.lock().await = ConnectionState::Disconnected;
                    Err(err)
                }
            }
        })
    }

    /// Discard the current session, if any
    ///
    /// Bumps the epoch first so the session's pump and close handler
    /// become inert, then rejects everything outstanding. Idempotent.
    async fn teardown(&self, reason: &str) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.keepalive.stop().await;
        if let Some(session) = self.session.lock().await.take() {
            session.close(reason).await;
        }
        self.dispatcher.fail_all().await;
    }

    /// Per-session frame pump: classifies inbound session events
    async fn pump(
        inner: Arc<ClientInner>,
        mut events_rx: mpsc::UnboundedReceiver<SessionEvent>,
        epoch: u64,
    ) {
        while let Some(event) = events_rx.recv().await {
            if inner.epoch.load(Ordering::SeqCst) != epoch {
                // Session superseded; late events are dropped
                break;
            }
            match event {
                SessionEvent::Frame(GatewayFrame::Res(response)) => {
                    inner.dispatcher.resolve(response).await;
                }
                SessionEvent::Frame(GatewayFrame::Event(event)) => {
                    inner.router.dispatch(event).await;
                }
                SessionEvent::Frame(GatewayFrame::Req(request)) => {
                    warn!(method = %request.method, "request frame from gateway dropped");
                }
                SessionEvent::Closed { reason } => {
                    ClientInner::on_session_closed(&inner, epoch, reason).await;
                    break;
                }
            }
        }
    }

    /// Handle an unexpected session close
    async fn on_session_closed(inner: &Arc<ClientInner>, epoch: u64, reason: String) {
        // Claim teardown rights; loses to any concurrent supersession
        if inner
            .epoch
            .compare_exchange(epoch, epoch + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        debug!(%reason, "session closed");
        inner.keepalive.stop().await;
        inner.session.lock().await.take();
        inner.dispatcher.fail_all().await;

        let was_connected = {
            let mut state = inner.state.lock().await;
            let previous = *state;
            *state = ConnectionState::Disconnected;
            previous == ConnectionState::Connected
        };
        let _ = inner
            .lifecycle_tx
            .send(LifecycleEvent::Disconnected { reason });

        if was_connected && inner.auto_reconnect.load(Ordering::SeqCst) {
            ClientInner::schedule_reconnect(inner).await;
        }
    }

    /// Start the backoff-driven reconnect loop
    async fn schedule_reconnect(inner: &Arc<ClientInner>) {
        let worker = inner.clone();
        let task = tokio::spawn(async move {
            loop {
                if !worker.auto_reconnect.load(Ordering::SeqCst) {
                    debug!("reconnect worker disarmed");
                    break;
                }

                let delay = worker
                    .reconnect
                    .lock()
                    .await
                    .next_delay(&worker.config.reconnect);
                let Some(delay) = delay else {
                    warn!(
                        attempts = worker.config.reconnect.max_attempts,
                        "reconnect attempts exhausted"
                    );
                    *worker.state.lock().await = ConnectionState::Exhausted;
                    let _ = worker.lifecycle_tx.send(LifecycleEvent::ReconnectExhausted);
                    break;
                };

                let attempt = worker.reconnect.lock().await.attempts();
                info!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
                tokio::time::sleep(delay).await;

                // Re-check after the sleep: disconnect() may have
                // disarmed while this worker was waiting out its delay
                if !worker.auto_reconnect.load(Ordering::SeqCst) {
                    debug!("scheduled reconnect cancelled by disconnect");
                    break;
                }

                match ClientInner::connect_once(&worker).await {
                    Ok(_) => break,
                    Err(err) if err.is_retryable() => {
                        warn!(attempt, error = %err, "reconnect attempt failed");
                    }
                    Err(err) => {
                        warn!(attempt, error = %err, "reconnect aborted");
                        break;
                    }
                }
            }
        });

        if let Some(previous) = inner.reconnect_task.lock().await.replace(task) {
            previous.abort();
        }
    }
}
