//! Event router
//!
//! Demultiplexes server-pushed frames to interested subscribers. One
//! broadcast channel per event name: a slow or failing consumer can lag
//! its own channel but never blocks siblings. The sequence tracker spots
//! gaps in the gateway's event counter; gap reports are advisory only —
//! events are never buffered, reordered, or replayed.

use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::types::events;
use crate::protocol::EventFrame;

const CHANNEL_CAPACITY: usize = 64;

/// A delivered event
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    /// Event name
    pub event: String,
    /// Event payload
    pub payload: Value,
    /// Server sequence number, when the frame carried one
    pub seq: Option<u64>,
}

/// Receiving half of one subscription
///
/// Dropping it unsubscribes; the router prunes channels with no
/// remaining receivers on the next dispatch.
pub struct EventSubscription {
    event: String,
    rx: broadcast::Receiver<EventEnvelope>,
}

impl EventSubscription {
    /// Next event, or `None` once the router is gone
    ///
    /// A lagged subscriber skips to the oldest retained event rather
    /// than failing.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(event = %self.event, missed, "subscriber lagged, events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Routes gateway events to subscribers by name
pub struct EventRouter {
    channels: Mutex<HashMap<String, broadcast::Sender<EventEnvelope>>>,
    last_seq: Mutex<Option<u64>>,
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRouter {
    /// Create an empty router
    pub fn new() -> Self {
        EventRouter {
            channels: Mutex::new(HashMap::new()),
            last_seq: Mutex::new(None),
        }
    }

    /// Subscribe to an event name
    pub async fn subscribe(&self, event: &str) -> EventSubscription {
        let mut channels = self.channels.lock().await;
        let tx = channels
            .entry(event.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        EventSubscription {
            event: event.to_string(),
            rx: tx.subscribe(),
        }
    }

    /// Wait for the next occurrence of an event, bounded by `wait_timeout`
    pub async fn wait_for(&self, event: &str, wait_timeout: Duration) -> Result<EventEnvelope> {
        let mut subscription = self.subscribe(event).await;
        match timeout(wait_timeout, subscription.recv()).await {
            Ok(Some(envelope)) => Ok(envelope),
            Ok(None) => Err(Error::Disconnected),
            Err(_) => Err(Error::RequestTimeout {
                method: format!("wait_for({})", event),
                id: 0,
            }),
        }
    }

    /// Dispatch one inbound event frame
    ///
    /// Sequence gaps are reported once per jump, before the tracker
    /// updates, and never delay delivery of the event itself.
    pub async fn dispatch(&self, frame: EventFrame) {
        if let Some(seq) = frame.seq {
            let mut last = self.last_seq.lock().await;
            if let Some(previous) = *last {
                if seq > previous + 1 {
                    warn!(
                        expected = previous + 1,
                        received = seq,
                        event = %frame.event,
                        "gap in gateway event sequence"
                    );
                    let gap = EventEnvelope {
                        event: events::LINK_GAP.to_string(),
                        payload: serde_json::json!({
                            "expected": previous + 1,
                            "received": seq,
                        }),
                        seq: None,
                    };
                    drop(last);
                    self.publish(gap).await;
                    last = self.last_seq.lock().await;
                }
            }
            *last = Some(seq);
        }

        self.publish(EventEnvelope {
            event: frame.event,
            payload: frame.payload,
            seq: frame.seq,
        })
        .await;
    }

    /// Forget the last observed sequence number; called per new session
    pub async fn reset_seq(&self) {
        *self.last_seq.lock().await = None;
    }

    async fn publish(&self, envelope: EventEnvelope) {
        let mut channels = self.channels.lock().await;
        let Some(tx) = channels.get(&envelope.event) else {
            debug!(event = %envelope.event, "event with no subscribers dropped");
            return;
        };
        if tx.send(envelope.clone()).is_err() {
            // All receivers dropped; prune the channel
            channels.remove(&envelope.event);
        }
    }
}
