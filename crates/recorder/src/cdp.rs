//! Low-level Chrome DevTools Protocol (CDP) client over WebSocket.
//!
//! Connects to the browser-level debugging endpoint. Tabs are reached through
//! flattened target sessions: commands carry a `sessionId`, and events coming
//! from an attached tab carry the same `sessionId` at the top level.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, warn};

/// An event pushed by the browser.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    /// Target session the event belongs to; `None` for browser-level events.
    pub session_id: Option<String>,
    pub params: Value,
}

struct EventListener {
    /// Empty means every event.
    methods: Vec<String>,
    tx: mpsc::UnboundedSender<CdpEvent>,
}

impl EventListener {
    fn wants(&self, method: &str) -> bool {
        self.methods.is_empty() || self.methods.iter().any(|m| m == method)
    }
}

type PendingMap = HashMap<u64, oneshot::Sender<Value>>;

/// A CDP WebSocket client that can send commands and receive responses/events.
pub struct CdpClient {
    /// Sender to write messages to the WebSocket.
    ws_tx: mpsc::Sender<String>,
    /// Pending command responses, keyed by request ID.
    pending: Arc<Mutex<PendingMap>>,
    /// Set once the reader task has stopped; no response can arrive after that.
    closed: Arc<AtomicBool>,
    /// Auto-incrementing command ID.
    next_id: AtomicU64,
    event_listeners: Arc<Mutex<Vec<EventListener>>>,
    /// Handle to the reader task so we can abort on close.
    _reader_handle: tokio::task::JoinHandle<()>,
    /// Handle to the writer task.
    _writer_handle: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    /// Connect to a Chrome CDP WebSocket endpoint.
    pub async fn connect(ws_url: &str) -> Result<Self, String> {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::connect_async;
        use tokio_tungstenite::tungstenite::Message;

        let (ws_stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| format!("Failed to connect to CDP endpoint {}: {}", ws_url, e))?;

        let (mut ws_sink, mut ws_stream_read) = ws_stream.split();

        // Channel for outgoing messages
        let (ws_tx, mut ws_rx) = mpsc::channel::<String>(256);

        let pending: Arc<Mutex<PendingMap>> = Arc::new(Mutex::new(HashMap::new()));
        let pending_clone = pending.clone();
        let closed = Arc::new(AtomicBool::new(false));
        let closed_clone = closed.clone();

        let event_listeners: Arc<Mutex<Vec<EventListener>>> = Arc::new(Mutex::new(Vec::new()));
        let events_clone = event_listeners.clone();

        // Writer task: owns the sink, forwards messages from channel
        let writer_handle = tokio::spawn(async move {
            while let Some(msg) = ws_rx.recv().await {
                if let Err(e) = ws_sink.send(Message::Text(msg)).await {
                    error!("CDP WebSocket write error: {}", e);
                    break;
                }
            }
        });

        // Reader task: reads from WebSocket, dispatches responses and events
        let reader_handle = tokio::spawn(async move {
            while let Some(msg_result) = ws_stream_read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        let Ok(val) = serde_json::from_str::<Value>(&text) else {
                            debug!("Ignoring non-JSON CDP frame");
                            continue;
                        };
                        if let Some(id) = val.get("id").and_then(|v| v.as_u64()) {
                            // This is a command response
                            let mut pending = pending_clone.lock().await;
                            if let Some(tx) = pending.remove(&id) {
                                let _ = tx.send(val);
                            }
                        } else if let Some(method) = val.get("method").and_then(|v| v.as_str()) {
                            let event = CdpEvent {
                                method: method.to_string(),
                                session_id: val
                                    .get("sessionId")
                                    .and_then(|v| v.as_str())
                                    .map(|s| s.to_string()),
                                params: val.get("params").cloned().unwrap_or(Value::Null),
                            };
                            let mut listeners = events_clone.lock().await;
                            listeners.retain(|l| {
                                !l.wants(&event.method) || l.tx.send(event.clone()).is_ok()
                            });
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("CDP WebSocket closed by server");
                        break;
                    }
                    Err(e) => {
                        warn!("CDP WebSocket read error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            // Fail every outstanding command and end every event stream.
            {
                let mut pending = pending_clone.lock().await;
                closed_clone.store(true, Ordering::SeqCst);
                pending.clear();
            }
            events_clone.lock().await.clear();
        });

        Ok(Self {
            ws_tx,
            pending,
            closed,
            next_id: AtomicU64::new(1),
            event_listeners,
            _reader_handle: reader_handle,
            _writer_handle: writer_handle,
        })
    }

    /// Send a browser-level CDP command and wait for the response.
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value, String> {
        self.send(None, method, params).await
    }

    /// Send a CDP command to an attached target session.
    pub async fn send_session_command(
        &self,
        session_id: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, String> {
        self.send(Some(session_id), method, params).await
    }

    async fn send(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value, String> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let mut msg = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(sid) = session_id {
            msg["sessionId"] = json!(sid);
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                return Err("CDP connection closed".to_string());
            }
            pending.insert(id, tx);
        }

        if let Err(e) = self.ws_tx.send(msg.to_string()).await {
            self.pending.lock().await.remove(&id);
            return Err(format!("Failed to send CDP command: {}", e));
        }

        // No timeout: a command only fails early when the connection drops.
        match rx.await {
            Ok(response) => {
                if let Some(error) = response.get("error") {
                    Err(format!("CDP error in '{}': {}", method, error))
                } else {
                    Ok(response.get("result").cloned().unwrap_or(Value::Null))
                }
            }
            Err(_) => Err(format!("CDP connection closed while waiting for '{}'", method)),
        }
    }

    /// Subscribe to a set of CDP events on a single ordered stream.
    /// An empty slice subscribes to every event.
    pub async fn subscribe_events(&self, methods: &[&str]) -> mpsc::UnboundedReceiver<CdpEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut listeners = self.event_listeners.lock().await;
        listeners.push(EventListener {
            methods: methods.iter().map(|m| m.to_string()).collect(),
            tx,
        });
        rx
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self._reader_handle.abort();
        self._writer_handle.abort();
    }
}
