//! In-process WebSocket server for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::client::{Engine, EngineBuilder, ReconnectConfig, RetryConfig, SearchConfig};

/// Computes the frames sent back for one received frame.
pub type Responder = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

#[derive(Default)]
struct Shared {
    /// Every parsed frame with its arrival time.
    received: Mutex<Vec<(Instant, Value)>>,
    clients: Mutex<Vec<mpsc::UnboundedSender<Message>>>,
    connections: AtomicUsize,
}

pub struct MockServer {
    url: Url,
    shared: Arc<Shared>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl MockServer {
    /// Server that records frames and never replies.
    pub async fn start() -> Self {
        Self::with_responder(Arc::new(|_| Vec::new())).await
    }

    /// Server that answers every frame through `responder`.
    pub async fn with_responder(responder: Responder) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let shared = Arc::new(Shared::default());

        let accept_shared = Arc::clone(&shared);
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                accept_shared.connections.fetch_add(1, Ordering::SeqCst);

                let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
                accept_shared.clients.lock().push(tx);

                let shared = Arc::clone(&accept_shared);
                let responder = Arc::clone(&responder);
                tokio::spawn(async move {
                    let (mut write, mut read) = ws.split();
                    loop {
                        tokio::select! {
                            incoming = read.next() => {
                                let text = match incoming {
                                    Some(Ok(Message::Text(text))) => text,
                                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                    Some(Ok(_)) => continue,
                                };
                                let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
                                    continue;
                                };
                                shared.received.lock().push((Instant::now(), frame.clone()));
                                for reply in responder(&frame) {
                                    if write.send(Message::Text(reply.to_string().into())).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            outgoing = rx.recv() => {
                                match outgoing {
                                    Some(message) => {
                                        if write.send(message).await.is_err() {
                                            break;
                                        }
                                    }
                                    None => {
                                        let _ = write.close().await;
                                        break;
                                    }
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            url: Url::parse(&format!("ws://127.0.0.1:{port}")).expect("url"),
            shared,
            accept_task: Mutex::new(Some(accept_task)),
        }
    }

    pub fn url(&self) -> Url {
        self.url.clone()
    }

    pub fn connection_count(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Every frame received with `action`, in arrival order.
    pub fn frames_for(&self, action: &str) -> Vec<Value> {
        self.matching(action).into_iter().map(|(_, frame)| frame).collect()
    }

    /// Arrival times of the frames with `action`.
    pub fn arrivals_for(&self, action: &str) -> Vec<Instant> {
        self.matching(action).into_iter().map(|(at, _)| at).collect()
    }

    fn matching(&self, action: &str) -> Vec<(Instant, Value)> {
        self.shared
            .received
            .lock()
            .iter()
            .filter(|(_, frame)| frame.get("action").and_then(Value::as_str) == Some(action))
            .cloned()
            .collect()
    }

    /// Waits up to five seconds for a frame with `action`.
    pub async fn wait_for_action(&self, action: &str) -> Value {
        for _ in 0..500 {
            if let Some(frame) = self.frames_for(action).into_iter().next() {
                return frame;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no {action} frame received");
    }

    /// Pushes a frame to every connected client.
    pub fn broadcast(&self, frame: Value) {
        let text = frame.to_string();
        self.shared
            .clients
            .lock()
            .retain(|client| client.send(Message::Text(text.clone().into())).is_ok());
    }

    /// Closes every open connection but keeps accepting new ones.
    pub fn drop_connections(&self) {
        self.shared.clients.lock().clear();
    }

    /// Stops accepting and closes every open connection.
    pub async fn shutdown(&self) {
        let task = self.accept_task.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
        self.drop_connections();
    }
}

/// Successful reply to `frame` carrying `fields`.
pub fn reply_ok(frame: &Value, fields: Value) -> Value {
    let mut reply = Map::new();
    reply.insert("requestId".into(), frame["requestId"].clone());
    reply.insert("action".into(), frame["action"].clone());
    reply.insert("success".into(), Value::Bool(true));
    if let Value::Object(extra) = fields {
        reply.extend(extra);
    }
    Value::Object(reply)
}

/// Failed reply to `frame` with `error`.
pub fn reply_err(frame: &Value, error: &str) -> Value {
    json!({
        "requestId": frame["requestId"].clone(),
        "action": frame["action"].clone(),
        "success": false,
        "error": error,
    })
}

/// Builder pointed at `server` with timings suited to tests.
pub fn engine_builder_for(server: &MockServer) -> EngineBuilder {
    Engine::builder()
        .endpoint(server.url().as_str())
        .heartbeat_interval(Duration::from_secs(3600))
        .min_request_interval(Duration::from_millis(1))
        .connect_timeout(Duration::from_secs(2))
        .reconnect(
            ReconnectConfig::default()
                .with_base_delay(Duration::from_millis(10))
                .with_max_attempts(5),
        )
        .search(SearchConfig::default().with_retry_delay(Duration::from_millis(10)))
        .thumbnail_retry(RetryConfig::default().with_base_delay(Duration::from_millis(5)))
}

/// Engine pointed at `server` with timings suited to tests.
pub fn engine_for(server: &MockServer) -> Engine {
    engine_builder_for(server).build().expect("engine")
}
