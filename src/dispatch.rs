//! Request dispatcher
//!
//! Assigns correlation ids, tracks in-flight requests, and resolves each
//! exactly once: on its matching response, on its timeout, or when the
//! owning session drops. The pending map is the single source of truth;
//! an entry is removed atomically with whichever resolution wins.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{GatewayFrame, ResponseFrame};
use crate::transport::TransportSession;

struct PendingRequest {
    sink: oneshot::Sender<Result<Value>>,
    method: String,
    issued_at: Instant,
}

/// Correlates outbound requests with their eventual responses
pub struct RequestDispatcher {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingRequest>>,
}

impl Default for RequestDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestDispatcher {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        RequestDispatcher {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Number of requests currently in flight
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Send `method` over `session` and await its response
    ///
    /// Fails with `RequestTimeout` when no response arrives within
    /// `request_timeout`, with `Remote` when the gateway reports failure,
    /// and with `Disconnected` when the session drops first.
    pub async fn request(
        &self,
        session: &TransportSession,
        method: &str,
        params: Value,
        request_timeout: Duration,
    ) -> Result<Value> {
        let (id, mut rx) = self.register(method).await;
        let frame = GatewayFrame::request(id.to_string(), method, params);

        if let Err(err) = session.send(&frame).await {
            // Never left pending if the send itself failed
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        match timeout(request_timeout, &mut rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped without resolution; treat as a session drop
            Ok(Err(_)) => Err(Error::Disconnected),
            Err(_elapsed) => {
                let removed = self.pending.lock().await.remove(&id);
                if removed.is_some() {
                    Err(Error::RequestTimeout {
                        method: method.to_string(),
                        id,
                    })
                } else {
                    // The response won the race against the timeout; the
                    // entry is gone and the sink already carries it
                    match rx.await {
                        Ok(result) => result,
                        Err(_) => Err(Error::Disconnected),
                    }
                }
            }
        }
    }

    /// Allocate a fresh correlation id and register its result sink
    async fn register(&self, method: &str) -> (u64, oneshot::Receiver<Result<Value>>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(
            id,
            PendingRequest {
                sink: tx,
                method: method.to_string(),
                issued_at: Instant::now(),
            },
        );
        (id, rx)
    }

    /// Resolve the pending request matching a response frame
    ///
    /// Responses with an unknown or unparseable id are ignored.
    pub async fn resolve(&self, response: ResponseFrame) {
        let id = match response.id.parse::<u64>() {
            Ok(id) => id,
            Err(_) => {
                warn!(id = %response.id, "response with non-numeric correlation id ignored");
                return;
            }
        };

        let entry = self.pending.lock().await.remove(&id);
        let Some(entry) = entry else {
            debug!(id, "response without pending request ignored");
            return;
        };

        debug!(
            id,
            method = %entry.method,
            elapsed_ms = entry.issued_at.elapsed().as_millis() as u64,
            ok = response.ok,
            "request resolved"
        );

        let result = if response.ok {
            Ok(response.payload.unwrap_or(Value::Null))
        } else {
            Err(Error::Remote(response.error_message()))
        };
        let _ = entry.sink.send(result);
    }

    /// Reject every outstanding request with `Disconnected`
    ///
    /// The one place multiple entries resolve in one operation; draining
    /// the map makes a second call a no-op.
    pub async fn fail_all(&self) {
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            return;
        }
        debug!(count = pending.len(), "rejecting outstanding requests");
        for (_, entry) in pending.drain() {
            let _ = entry.sink.send(Err(Error::Disconnected));
        }
    }
}
