//! Keepalive monitor
//!
//! Issues a lightweight `ping` request at a fixed interval while a
//! session is connected, so the gateway never treats the link as idle.
//! A failed keepalive is logged and otherwise ignored: the transport's
//! own failure is the sole disconnect trigger.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::dispatch::RequestDispatcher;
use crate::transport::TransportSession;

/// Periodic keepalive task handle
pub struct KeepaliveMonitor {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for KeepaliveMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl KeepaliveMonitor {
    /// Create a stopped monitor
    pub fn new() -> Self {
        KeepaliveMonitor {
            task: Mutex::new(None),
        }
    }

    /// Start pinging over `session`; replaces any previous task
    pub async fn start(
        &self,
        session: Arc<TransportSession>,
        dispatcher: Arc<RequestDispatcher>,
        interval: Duration,
        request_timeout: Duration,
    ) {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; the session was just
            // handshaken, so skip it
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match dispatcher
                    .request(&session, "ping", serde_json::json!({}), request_timeout)
                    .await
                {
                    Ok(_) => debug!(session = session.id(), "keepalive ok"),
                    Err(err) => {
                        debug!(session = session.id(), error = %err, "keepalive failed")
                    }
                }
            }
        });

        if let Some(previous) = self.task.lock().await.replace(task) {
            previous.abort();
        }
    }

    /// Stop immediately; never leaks a timer across reconnects
    pub async fn stop(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let monitor = KeepaliveMonitor::new();
        monitor.stop().await;
        monitor.stop().await;
    }
}
