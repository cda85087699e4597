//! Low-level CDP transport: one WebSocket, request/response matching by id,
//! events fanned out to anyone listening. No retries, no reconnect logic —
//! that belongs to the watcher's connection manager, which owns the decision
//! of *when* to reconnect and *what* to re-enable afterwards.

use dashmap::DashMap;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{CdpError, Result};
use crate::protocol::*;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

const EVENT_CHANNEL_CAPACITY: usize = 4096;

/// A single WebSocket connection to a CDP endpoint (browser or page target).
pub struct CdpClient {
    next_id: AtomicU64,
    pending: Arc<DashMap<RequestId, oneshot::Sender<CdpResponse>>>,
    events: broadcast::Sender<CdpEvent>,
    ws_sink: Arc<RwLock<WsSink>>,
    closed: Arc<std::sync::atomic::AtomicBool>,
}

impl CdpClient {
    pub async fn connect(ws_url: &str) -> Result<Arc<Self>> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (sink, mut stream) = ws_stream.split();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let client = Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending: Arc::new(DashMap::new()),
            events,
            ws_sink: Arc::new(RwLock::new(sink)),
            closed: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        });

        let worker = client.clone();
        tokio::spawn(async move {
            loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = worker.handle_message(&text) {
                            tracing::warn!(error = %e, "failed to decode cdp frame");
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!("cdp websocket closed by peer");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "cdp websocket error");
                        break;
                    }
                    _ => {}
                }
            }
            worker.closed.store(true, Ordering::SeqCst);
            worker.pending.clear();
        });

        Ok(client)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Subscribe to the raw event stream; the caller filters by `method`.
    /// A broadcast channel (rather than per-method callbacks) keeps this
    /// crate free of any knowledge of which domains the watcher cares about.
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    pub async fn send_request(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        session_id: Option<SessionId>,
    ) -> Result<Value> {
        if self.is_closed() {
            return Err(CdpError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = CdpRequest {
            id,
            method: method.into(),
            params,
            session_id,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let json = serde_json::to_string(&request)?;
        {
            let mut sink = self.ws_sink.write().await;
            if let Err(e) = sink.send(Message::Text(json)).await {
                self.pending.remove(&id);
                return Err(CdpError::WebSocket(e));
            }
        }

        let response = rx.await.map_err(|_| CdpError::Closed)?;
        if let Some(error) = response.error {
            return Err(CdpError::Protocol {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    pub async fn send_request_timeout(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        session_id: Option<SessionId>,
        timeout: std::time::Duration,
    ) -> Result<Value> {
        tokio::time::timeout(timeout, self.send_request(method, params, session_id))
            .await
            .map_err(|_| CdpError::Timeout)?
    }

    fn handle_message(&self, text: &str) -> Result<()> {
        let msg: CdpMessage = serde_json::from_str(text)?;
        match msg {
            CdpMessage::Response(response) => {
                if let Some((_, tx)) = self.pending.remove(&response.id) {
                    let _ = tx.send(response);
                } else {
                    tracing::debug!(id = response.id, "response for unknown request id");
                }
            }
            CdpMessage::Event(event) => {
                // No receivers is not an error; buffers/controllers may not
                // have subscribed yet during early attach.
                let _ = self.events.send(event);
            }
        }
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let mut sink = self.ws_sink.write().await;
        sink.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore]
    async fn test_connect() {
        let client = CdpClient::connect("ws://localhost:9222/devtools/browser")
            .await
            .unwrap();
        let result = client
            .send_request("Browser.getVersion", None, None)
            .await
            .unwrap();
        println!("browser version: {result:?}");
    }
}
