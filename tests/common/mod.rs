//! In-process mock Widgeteer server
//!
//! Accepts WebSocket connections on an ephemeral localhost port, records
//! every inbound frame, and answers through a per-test handler. Frames can
//! also be pushed to the most recent connection at any time.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Maps one inbound frame to the frames sent back, in order
pub type Handler = Arc<dyn Fn(&Value) -> Vec<String> + Send + Sync>;

pub struct MockServer {
    pub port: u16,
    received: Arc<Mutex<Vec<Value>>>,
    pusher: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
}

impl MockServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Value) -> Vec<String> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let pusher = Arc::new(Mutex::new(None));

        {
            let received = Arc::clone(&received);
            let pusher = Arc::clone(&pusher);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                        continue;
                    };
                    let (tx, rx) = mpsc::unbounded_channel();
                    *pusher.lock().unwrap() = Some(tx);
                    tokio::spawn(serve(ws, rx, Arc::clone(&handler), Arc::clone(&received)));
                }
            });
        }

        Self {
            port,
            received,
            pusher,
        }
    }

    /// Server that acknowledges everything with an empty result
    pub async fn ack_all() -> Self {
        Self::start(|req| vec![ok(req, json!({}))]).await
    }

    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Every frame received so far
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }

    /// Received frames carrying the given command name
    pub fn commands_named(&self, name: &str) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter(|f| f["command"] == name)
            .collect()
    }

    /// Send a frame to the most recent connection
    pub fn push(&self, frame: String) {
        if let Some(tx) = self.pusher.lock().unwrap().as_ref() {
            let _ = tx.send(frame);
        }
    }

    /// Wait until at least `count` frames have arrived
    pub async fn wait_for_frames(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.received.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("frames did not arrive");
    }
}

async fn serve(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    mut pushed: mpsc::UnboundedReceiver<String>,
    handler: Handler,
    received: Arc<Mutex<Vec<Value>>>,
) {
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let request: Value = serde_json::from_str(text.as_str()).unwrap();
                    received.lock().unwrap().push(request.clone());
                    for reply in handler(&request) {
                        if sink.send(Message::Text(reply.into())).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            },
            Some(frame) = pushed.recv() => {
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Successful response to `request`
pub fn ok(request: &Value, result: Value) -> String {
    json!({
        "type": "response",
        "id": request["id"],
        "success": true,
        "result": result,
        "duration_ms": 1
    })
    .to_string()
}

/// Failed response to `request`
pub fn fail(request: &Value, code: &str, message: &str) -> String {
    json!({
        "type": "response",
        "id": request["id"],
        "success": false,
        "error": { "code": code, "message": message }
    })
    .to_string()
}

/// Server-pushed event frame
pub fn event(event_type: &str, data: Value) -> String {
    json!({ "type": "event", "event_type": event_type, "data": data }).to_string()
}
