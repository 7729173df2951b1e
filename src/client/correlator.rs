//! Request/response correlation.
//!
//! Every outbound request registers a single-use slot keyed by its
//! [`RequestId`]. Whoever removes the slot from the pending map resolves it:
//! a matching inbound message, the timeout, or a bulk failure. The slot is
//! therefore resolved exactly once and never leaks.
//!
//! Transmissions are spaced at least `min_interval` apart across the whole
//! process.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{Action, InboundMessage, OutboundRequest};
use crate::transport::Channel;

use super::chat::ChatFeed;

// ============================================================================
// Types
// ============================================================================

type Outcome = Result<InboundMessage>;

/// One in-flight request.
struct PendingRequest {
    action: Action,
    created_at: Instant,
    tx: oneshot::Sender<Outcome>,
}

// ============================================================================
// Correlator
// ============================================================================

/// Matches inbound messages to outbound requests.
pub struct Correlator {
    /// In-flight requests.
    pending: Mutex<FxHashMap<RequestId, PendingRequest>>,

    /// Time of the last transmission. Held across the throttle wait.
    last_transmit: AsyncMutex<Option<Instant>>,

    /// Minimum spacing between transmissions.
    min_interval: Duration,

    /// Destination for chat messages.
    chat: ChatFeed,
}

impl Correlator {
    /// Creates an empty correlator.
    #[must_use]
    pub fn new(min_interval: Duration, chat: ChatFeed) -> Self {
        Self {
            pending: Mutex::new(FxHashMap::default()),
            last_transmit: AsyncMutex::new(None),
            min_interval,
            chat,
        }
    }

    /// Number of in-flight requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Sends `request` over `channel` and waits for its response.
    ///
    /// The returned message may still carry `success: false`; converting it
    /// is up to the caller.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateRequest`] if the id is already in flight (nothing is sent)
    /// - [`Error::RequestTimeout`] if no response arrives within `timeout`
    /// - Connection errors from connecting or transmitting
    /// - Whatever error a bulk failure resolved the request with
    pub async fn send<C>(
        &self,
        channel: &C,
        request: OutboundRequest,
        timeout: Duration,
    ) -> Result<InboundMessage>
    where
        C: Channel + ?Sized,
    {
        let frame = request.to_frame()?;
        let request_id = request.request_id().clone();
        let action = request.action();

        let mut rx = self.register(&request_id, action)?;

        if let Err(e) = self.transmit(channel, &request_id, frame).await {
            if self.pending.lock().remove(&request_id).is_some() {
                debug!(request_id = %request_id, %action, error = %e, "Request not sent");
                return Err(e);
            }
            // Already resolved elsewhere; that outcome wins.
            return rx.await.unwrap_or(Err(Error::ConnectionClosed));
        }

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                if self.pending.lock().remove(&request_id).is_some() {
                    warn!(request_id = %request_id, %action, timeout_ms = timeout.as_millis() as u64, "Request timed out");
                    return Err(Error::request_timeout(
                        request_id,
                        timeout.as_millis() as u64,
                    ));
                }
                // Resolved between the deadline and the removal.
                rx.await.unwrap_or(Err(Error::ConnectionClosed))
            }
        }
    }

    /// Routes one inbound text frame.
    ///
    /// Malformed frames and unmatched responses are dropped.
    pub fn dispatch(&self, text: &str) {
        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                return;
            }
        };

        let entry = message
            .request_id
            .as_ref()
            .and_then(|id| self.pending.lock().remove(id));

        if let Some(entry) = entry {
            if entry.action == Action::ChatMessage
                && message.success
                && let Some(stored) = message.get("message")
            {
                self.chat.publish_value(stored);
            }

            trace!(
                action = %entry.action,
                elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
                "Response matched"
            );
            let _ = entry.tx.send(Ok(message));
            return;
        }

        if message.is_chat_broadcast() {
            self.chat.publish_value(&message.payload_value());
            return;
        }

        trace!(
            request_id = ?message.request_id,
            action = ?message.action,
            "Dropping unmatched message"
        );
    }

    /// Fails every in-flight request with an error from `make_error`.
    ///
    /// Returns the number of requests failed.
    pub fn fail_all(&self, make_error: impl Fn() -> Error) -> usize {
        let drained: Vec<PendingRequest> = {
            let mut pending = self.pending.lock();
            pending.drain().map(|(_, entry)| entry).collect()
        };

        let count = drained.len();
        for entry in drained {
            let _ = entry.tx.send(Err(make_error()));
        }
        if count > 0 {
            debug!(count, "Failed pending requests");
        }
        count
    }
}

// ============================================================================
// Correlator - Internals
// ============================================================================

impl Correlator {
    /// Registers a slot, rejecting ids already in flight.
    fn register(&self, request_id: &RequestId, action: Action) -> Result<oneshot::Receiver<Outcome>> {
        let mut pending = self.pending.lock();
        if pending.contains_key(request_id) {
            return Err(Error::duplicate_request(request_id.clone()));
        }

        let (tx, rx) = oneshot::channel();
        pending.insert(
            request_id.clone(),
            PendingRequest {
                action,
                created_at: Instant::now(),
                tx,
            },
        );
        Ok(rx)
    }

    /// Connects if needed, waits out the throttle, then hands the frame over.
    async fn transmit<C>(&self, channel: &C, request_id: &RequestId, frame: String) -> Result<()>
    where
        C: Channel + ?Sized,
    {
        if !channel.is_connected() {
            channel.ensure_connected().await?;
        }

        let mut last = self.last_transmit.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if Instant::now() < ready_at {
                trace!(request_id = %request_id, "Throttling request");
                sleep_until(ready_at).await;
            }
        }

        if !self.pending.lock().contains_key(request_id) {
            return Ok(());
        }

        channel.transmit(frame)?;
        *last = Some(Instant::now());
        trace!(request_id = %request_id, "Request transmitted");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use async_trait::async_trait;
    use serde_json::{Value, json};

    #[derive(Default)]
    struct FakeChannel {
        frames: Mutex<Vec<(Instant, String)>>,
        connects: AtomicU32,
        connected: AtomicBool,
    }

    #[async_trait]
    impl Channel for FakeChannel {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn ensure_connected(&self) -> Result<()> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn transmit(&self, frame: String) -> Result<()> {
            self.frames.lock().push((Instant::now(), frame));
            Ok(())
        }
    }

    impl FakeChannel {
        fn sent(&self) -> usize {
            self.frames.lock().len()
        }

        fn frame(&self, index: usize) -> Value {
            serde_json::from_str(&self.frames.lock()[index].1).expect("json")
        }

        async fn wait_for(&self, count: usize) {
            while self.sent() < count {
                tokio::task::yield_now().await;
            }
        }
    }

    fn setup() -> (Arc<Correlator>, Arc<FakeChannel>, ChatFeed) {
        let chat = ChatFeed::new(16);
        let correlator = Arc::new(Correlator::new(Duration::from_millis(100), chat.clone()));
        (correlator, Arc::new(FakeChannel::default()), chat)
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_resolves_request() {
        let (correlator, channel, _) = setup();

        let task = {
            let (correlator, channel) = (Arc::clone(&correlator), Arc::clone(&channel));
            tokio::spawn(async move {
                correlator
                    .send(channel.as_ref(), OutboundRequest::join_chat("v1"), Duration::from_secs(10))
                    .await
            })
        };

        channel.wait_for(1).await;
        assert_eq!(channel.connects.load(Ordering::SeqCst), 1);

        let request_id = channel.frame(0)["requestId"].clone();
        correlator.dispatch(
            &json!({ "requestId": request_id, "action": "join_chat", "success": true, "messages": [] })
                .to_string(),
        );

        let response = task.await.expect("join").expect("response");
        assert!(response.success);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_request_sends_nothing() {
        let (correlator, channel, _) = setup();
        let id = RequestId::new("dup-1");

        let first = {
            let (correlator, channel, id) = (Arc::clone(&correlator), Arc::clone(&channel), id.clone());
            tokio::spawn(async move {
                let request = OutboundRequest::with_id(id, Action::Search, Default::default());
                correlator.send(channel.as_ref(), request, Duration::from_secs(5)).await
            })
        };
        channel.wait_for(1).await;

        let second = OutboundRequest::with_id(id, Action::Search, Default::default());
        let result = correlator
            .send(channel.as_ref(), second, Duration::from_secs(5))
            .await;

        assert!(matches!(result, Err(Error::DuplicateRequest { .. })));
        assert_eq!(channel.sent(), 1);

        let first = first.await.expect("first");
        assert!(first.is_err_and(|e| e.is_timeout()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_interval_between_transmissions() {
        let (correlator, channel, _) = setup();

        let spawn_send = |correlator: Arc<Correlator>, channel: Arc<FakeChannel>| {
            tokio::spawn(async move {
                correlator
                    .send(channel.as_ref(), OutboundRequest::search("q", 0, 0), Duration::from_secs(1))
                    .await
            })
        };

        let a = spawn_send(Arc::clone(&correlator), Arc::clone(&channel));
        tokio::time::sleep(Duration::from_millis(10)).await;
        let b = spawn_send(Arc::clone(&correlator), Arc::clone(&channel));

        let _ = a.await;
        let _ = b.await;

        let frames = channel.frames.lock();
        assert_eq!(frames.len(), 2);
        assert!(frames[1].0 - frames[0].0 >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_entry_and_drops_late_response() {
        let (correlator, channel, _) = setup();

        let result = correlator
            .send(channel.as_ref(), OutboundRequest::generate_caption("t", "d"), Duration::from_millis(50))
            .await;

        let err = result.expect_err("timeout");
        assert!(matches!(err, Error::RequestTimeout { timeout_ms: 50, .. }));
        assert_eq!(correlator.pending_count(), 0);

        let request_id = channel.frame(0)["requestId"].clone();
        correlator.dispatch(
            &json!({ "requestId": request_id, "success": true, "caption": "late" }).to_string(),
        );
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_all_resolves_waiters() {
        let (correlator, channel, _) = setup();

        let task = {
            let (correlator, channel) = (Arc::clone(&correlator), Arc::clone(&channel));
            tokio::spawn(async move {
                correlator
                    .send(channel.as_ref(), OutboundRequest::search("q", 0, 0), Duration::from_secs(30))
                    .await
            })
        };
        channel.wait_for(1).await;

        assert_eq!(correlator.fail_all(|| Error::reconnect_exhausted(5)), 1);

        let err = task.await.expect("task").expect_err("failed");
        assert_eq!(err.to_string(), "Max reconnection attempts reached (5)");
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_goes_to_chat_feed() {
        let (correlator, _, chat) = setup();
        let mut rx = chat.subscribe();

        correlator.dispatch(
            &json!({
                "action": "chat_message",
                "broadcast": true,
                "userId": "u1",
                "username": "ann",
                "content": "hello",
                "videoId": "v1"
            })
            .to_string(),
        );

        let message = rx.try_recv().expect("delivered");
        assert_eq!(message.content, "hello");
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_broadcast_is_dropped() {
        let (correlator, _, chat) = setup();
        let mut rx = chat.subscribe();

        correlator.dispatch(
            &json!({ "action": "chat_message", "broadcast": true, "username": "ann", "content": "x", "videoId": "v1" })
                .to_string(),
        );
        correlator.dispatch("not json");

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_message_response_feeds_chat_before_resolving() {
        let (correlator, channel, chat) = setup();
        let mut rx = chat.subscribe();

        let task = {
            let (correlator, channel) = (Arc::clone(&correlator), Arc::clone(&channel));
            tokio::spawn(async move {
                let message = crate::protocol::ChatMessage::new("u1", "ann", "hi", "v1");
                let request = OutboundRequest::chat_message(&message).expect("request");
                correlator.send(channel.as_ref(), request, Duration::from_secs(10)).await
            })
        };
        channel.wait_for(1).await;

        let request_id = channel.frame(0)["requestId"].clone();
        correlator.dispatch(
            &json!({
                "requestId": request_id,
                "action": "chat_message",
                "success": true,
                "message": { "userId": "u1", "username": "ann", "content": "hi", "videoId": "v1" }
            })
            .to_string(),
        );

        assert_eq!(rx.try_recv().expect("echo").content, "hi");
        assert!(task.await.expect("task").is_ok());
    }
}
