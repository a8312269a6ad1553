//! Transport session
//!
//! Owns the raw WebSocket. One `TransportSession` corresponds to one
//! socket lifetime: it yields every inbound frame plus exactly one
//! terminal `Closed` notification, then nothing more. Late wire data for
//! a session that was already closed is discarded here rather than
//! assumed impossible.

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::GatewayFrame;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Inbound notification from a session
#[derive(Debug)]
pub enum SessionEvent {
    /// A parsed gateway frame
    Frame(GatewayFrame),
    /// Terminal notification; emitted exactly once per session
    Closed { reason: String },
}

/// One open WebSocket to the gateway
pub struct TransportSession {
    id: u64,
    writer: Mutex<Option<WsWriter>>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    closed: AtomicBool,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl TransportSession {
    /// Open a socket to `url`, bounded by `open_timeout`
    ///
    /// Returns the session plus the receiving end of its event stream.
    /// Exactly one of `opened` (Ok) or `failed` (Err) happens per call.
    pub async fn open(
        url: &Url,
        open_timeout: Duration,
    ) -> Result<(std::sync::Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>)> {
        let connected = timeout(open_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                Error::ConnectFailed(format!("open timed out after {:?}", open_timeout))
            })?
            .map_err(|err| Error::ConnectFailed(err.to_string()))?;

        let (stream, _response) = connected;
        let (writer, reader) = stream.split();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let session = std::sync::Arc::new(TransportSession {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst),
            writer: Mutex::new(Some(writer)),
            events_tx,
            closed: AtomicBool::new(false),
            reader_task: Mutex::new(None),
        });

        let task = tokio::spawn(Self::read_loop(session.clone(), reader));
        *session.reader_task.lock().await = Some(task);

        debug!(session = session.id, url = %url, "transport session opened");
        Ok((session, events_rx))
    }

    /// Session identity, used to discard events from stale sessions
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Send one frame
    pub async fn send(&self, frame: &GatewayFrame) -> Result<()> {
        let text = serde_json::to_string(frame)?;
        let mut writer_guard = self.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or(Error::NotConnected)?;
        writer
            .send(Message::Text(text.into()))
            .await
            .map_err(|err| Error::WebSocket(err.to_string()))
    }

    /// Close the session
    ///
    /// Best-effort close frame, then the terminal `Closed` notification
    /// if the read loop has not already emitted one. Safe to call twice.
    pub async fn close(&self, reason: &str) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(err) = writer.send(Message::Close(None)).await {
                debug!(session = self.id, error = %err, "close frame not delivered");
            }
        }

        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
        }

        self.emit_closed(reason);
    }

    /// Emit the terminal notification at most once
    fn emit_closed(&self, reason: &str) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(session = self.id, reason, "transport session closed");
            let _ = self.events_tx.send(SessionEvent::Closed {
                reason: reason.to_string(),
            });
        }
    }

    async fn read_loop(
        session: std::sync::Arc<TransportSession>,
        mut reader: futures::stream::SplitStream<WsStream>,
    ) {
        let reason = loop {
            match reader.next().await {
                Some(Ok(Message::Text(text))) => {
                    if session.closed.load(Ordering::SeqCst) {
                        // Late wire data for a closed session
                        continue;
                    }
                    match serde_json::from_str::<GatewayFrame>(text.as_ref()) {
                        Ok(frame) => {
                            if session.events_tx.send(SessionEvent::Frame(frame)).is_err() {
                                break "consumer dropped".to_string();
                            }
                        }
                        Err(err) => {
                            // Malformed frames are dropped, never fatal
                            warn!(session = session.id, error = %err, "dropping unparseable frame");
                        }
                    }
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Binary(_))) => {
                    warn!(session = session.id, "dropping unexpected binary frame");
                }
                Some(Ok(Message::Close(_))) => break "closed by gateway".to_string(),
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(err)) => break format!("read error: {}", err),
                None => break "stream ended".to_string(),
            }
        };

        session.emit_closed(&reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn local_ws_server<F, Fut>(handler: F) -> Url
    where
        F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                handler(ws).await;
            }
        });
        Url::parse(&format!("ws://{}", addr)).unwrap()
    }

    #[tokio::test]
    async fn test_open_failure_is_connect_failed() {
        // Bind then drop to get a port with nothing listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("ws://{}", addr)).unwrap();
        match TransportSession::open(&url, Duration::from_secs(2)).await {
            Err(Error::ConnectFailed(_)) => {}
            other => panic!("expected ConnectFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_malformed_frames_dropped_and_close_terminal() {
        let url = local_ws_server(|mut ws| async move {
            ws.send(Message::Text("this is not json".into()))
                .await
                .unwrap();
            ws.send(Message::Text(
                r#"{"type":"event","event":"channel.status","payload":{}}"#.into(),
            ))
            .await
            .unwrap();
            let _ = ws.close(None).await;
        })
        .await;

        let (session, mut events) = TransportSession::open(&url, Duration::from_secs(2))
            .await
            .unwrap();

        match events.recv().await {
            Some(SessionEvent::Frame(GatewayFrame::Event(event))) => {
                assert_eq!(event.event, "channel.status");
            }
            other => panic!("expected the valid event frame, got {:?}", other),
        }
        match events.recv().await {
            Some(SessionEvent::Closed { .. }) => {}
            other => panic!("expected closed notification, got {:?}", other),
        }

        // With every sender gone the stream must end, not yield again
        drop(session);
        assert!(events.recv().await.is_none(), "closed must be terminal");
    }

    #[tokio::test]
    async fn test_client_close_emits_single_closed() {
        let url = local_ws_server(|mut ws| async move {
            // Hold the socket open until the peer closes
            while let Some(Ok(message)) = ws.next().await {
                if matches!(message, Message::Close(_)) {
                    break;
                }
            }
        })
        .await;

        let (session, mut events) = TransportSession::open(&url, Duration::from_secs(2))
            .await
            .unwrap();

        session.close("test shutdown").await;
        session.close("called twice").await;

        match events.recv().await {
            Some(SessionEvent::Closed { reason }) => assert_eq!(reason, "test shutdown"),
            other => panic!("expected closed notification, got {:?}", other),
        }

        drop(session);
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_after_close_is_error() {
        let url = local_ws_server(|mut ws| async move {
            while ws.next().await.is_some() {}
        })
        .await;

        let (session, _events) = TransportSession::open(&url, Duration::from_secs(2))
            .await
            .unwrap();
        session.close("done").await;

        let frame = GatewayFrame::request("1", "ping", serde_json::json!({}));
        assert!(session.send(&frame).await.is_err());
    }
}
