//! WebSocket connection and background receive task
//!
//! A [`Connection`] owns the write half of the socket. The read half is
//! moved into a single receive task that routes every inbound frame either
//! to the pending request table or to the event dispatcher.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::common::{Error, Result};

use super::events::EventDispatcher;
use super::pending::PendingRequests;
use super::protocol::{decode_inbound, Inbound, Message};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;

/// Persistent duplex channel to a Widgeteer server
pub struct Connection {
    /// Server URL including any token query
    url: String,
    /// Write half; `None` while disconnected
    writer: tokio::sync::Mutex<Option<WsSink>>,
    /// Receive task handle; `None` while disconnected
    receiver: Mutex<Option<JoinHandle<()>>>,
    /// Requests waiting for a response
    pending: Arc<PendingRequests>,
    /// Handlers for pushed events
    events: Arc<EventDispatcher>,
}

impl Connection {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            writer: tokio::sync::Mutex::new(None),
            receiver: Mutex::new(None),
            pending: Arc::new(PendingRequests::new()),
            events: Arc::new(EventDispatcher::new()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    pub fn pending(&self) -> &Arc<PendingRequests> {
        &self.pending
    }

    /// Whether the receive task is alive
    ///
    /// Turns false on its own once the server closes the socket.
    pub fn is_connected(&self) -> bool {
        let receiver = self.receiver.lock().unwrap_or_else(|p| p.into_inner());
        receiver.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Open the socket and start the receive task
    ///
    /// Calling this while already connected does nothing.
    pub async fn connect(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let (stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::connection_failed(&self.url, e))?;
        let (sink, stream) = stream.split();

        let task = tokio::spawn(receive_loop(
            stream,
            Arc::clone(&self.pending),
            Arc::clone(&self.events),
        ));

        *writer = Some(sink);
        let previous = self
            .receiver
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }

        tracing::info!("Connected to {}", self.url);
        Ok(())
    }

    /// Stop the receive task and close the socket
    ///
    /// Safe to call when already disconnected. Requests still waiting are
    /// not failed here; they run into their own timeouts.
    pub async fn disconnect(&self) {
        let task = self
            .receiver
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }

        let sink = self.writer.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                tracing::debug!("Error closing WebSocket: {}", e);
            }
            tracing::info!("Disconnected from {}", self.url);
        }
    }

    /// Fails with `ConnectionClosed` when the server dropped a live socket
    fn ensure_connected(&self) -> Result<()> {
        let receiver = self.receiver.lock().unwrap_or_else(|p| p.into_inner());
        match receiver.as_ref() {
            None => Err(Error::NotConnected),
            Some(task) if task.is_finished() => Err(Error::ConnectionClosed),
            Some(_) => Ok(()),
        }
    }

    /// Send one message and wait for the response with the same id
    ///
    /// Returns the raw response frame.
    pub async fn send_and_wait(&self, mut message: Message, timeout: Duration) -> Result<Value> {
        self.ensure_connected()?;

        let id = message.ensure_id();
        let (_guard, rx) = self.pending.register(&id);
        self.transmit(std::slice::from_ref(&message)).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(_)) => Err(Error::Cancelled(id)),
            Err(_) => Err(Error::Timeout {
                id,
                secs: timeout.as_secs_f64(),
            }),
        }
    }

    /// Send several messages back to back, then collect every response
    ///
    /// All waiters share one deadline. Results come back in input order;
    /// responses that miss the deadline become `Error::Timeout` entries
    /// while the ones that arrived are kept.
    pub async fn send_batch(
        &self,
        mut messages: Vec<Message>,
        timeout: Duration,
    ) -> Result<Vec<Result<Value>>> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_connected()?;

        let mut waiters = Vec::with_capacity(messages.len());
        for message in &mut messages {
            let id = message.ensure_id();
            waiters.push(self.pending.register(&id));
        }

        self.transmit(&messages).await?;

        let deadline = tokio::time::Instant::now() + timeout;
        let mut results = Vec::with_capacity(waiters.len());
        for (guard, rx) in waiters {
            let id = guard.id().to_string();
            let outcome = match tokio::time::timeout_at(deadline, rx).await {
                Ok(Ok(raw)) => Ok(raw),
                Ok(Err(_)) => Err(Error::Cancelled(id)),
                Err(_) => Err(Error::Timeout {
                    id,
                    secs: timeout.as_secs_f64(),
                }),
            };
            results.push(outcome);
        }
        Ok(results)
    }

    /// Write messages without waiting between them, then flush once
    async fn transmit(&self, messages: &[Message]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(Error::NotConnected)?;
        for message in messages {
            let text = serde_json::to_string(&message.to_wire())?;
            tracing::debug!("WS >>> {}", text);
            sink.feed(WsMessage::Text(text.into())).await?;
        }
        sink.flush().await?;
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let receiver = self
            .receiver
            .get_mut()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(task) = receiver {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.url)
            .field("connected", &self.is_connected())
            .field("pending", &self.pending.len())
            .finish()
    }
}

async fn receive_loop(
    mut stream: SplitStream<WsStream>,
    pending: Arc<PendingRequests>,
    events: Arc<EventDispatcher>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => handle_frame(text.as_str(), &pending, &events),
            Ok(WsMessage::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => handle_frame(text, &pending, &events),
                Err(e) => tracing::warn!("Dropping non-UTF-8 binary frame: {}", e),
            },
            Ok(WsMessage::Close(frame)) => {
                tracing::info!("Server closed the connection: {:?}", frame);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("WebSocket receive failed: {}", e);
                break;
            }
        }
    }
    tracing::debug!("Receive loop stopped");
}

/// Route one inbound text frame
pub(crate) fn handle_frame(text: &str, pending: &PendingRequests, events: &Arc<EventDispatcher>) {
    tracing::debug!("WS <<< {}", text);
    match decode_inbound(text) {
        Ok(Inbound::Response { id, body }) => {
            if !pending.resolve(&id, body) {
                tracing::warn!("Dropping response for unknown request '{}'", id);
            }
        }
        Ok(Inbound::Event(event)) => events.dispatch(event),
        Ok(Inbound::Unknown(kind)) => tracing::debug!("Ignoring '{}' frame", kind),
        Err(e) => tracing::warn!("Dropping malformed frame: {}", e),
    }
}
