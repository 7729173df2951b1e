//! Engine service object.
//!
//! The [`Engine`] ties the connection manager, the correlator and the
//! operation modules together. It is cheap to clone; all clones share one
//! connection.
//!
//! # Lifecycle
//!
//! ```text
//! build() ──► ready ──► dispose() ──► disposed
//!               ▲           │
//!               └───────────┘ deferred while subscribers remain
//! ```
//!
//! # Example
//!
//! ```no_run
//! use aitube_client::Engine;
//!
//! # async fn example() -> aitube_client::Result<()> {
//! let engine = Engine::builder()
//!     .endpoint("wss://aitube.example/ws")
//!     .build()?;
//!
//! let _subscription = engine.subscribe("home");
//! engine.connect().await?;
//! let caption = engine.generate_caption("Cats", "cats on a beach").await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tokio::sync::{Mutex as AsyncMutex, broadcast, watch};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::SubscriberId;
use crate::protocol::{InboundMessage, OutboundRequest};
use crate::transport::{ConnectionManager, ConnectionState, ManagerHooks};

use super::builder::EngineBuilder;
use super::cache::ThumbnailCache;
use super::chat::ChatFeed;
use super::config::EngineConfig;
use super::correlator::Correlator;
use super::gate::{SubscriberGate, SubscriberGuard};
use super::search::SearchSessions;

// ============================================================================
// Constants
// ============================================================================

/// Buffered chat messages per receiver.
const CHAT_CAPACITY: usize = 256;

/// Buffered search events per receiver.
const SEARCH_CAPACITY: usize = 256;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the engine.
pub(crate) struct EngineInner {
    pub config: EngineConfig,

    /// Connection lifecycle.
    pub manager: Arc<ConnectionManager>,

    /// Pending requests and inbound routing.
    pub correlator: Arc<Correlator>,

    pub chat: ChatFeed,

    /// Rooms to rejoin after a reconnection.
    pub rooms: Mutex<FxHashSet<String>>,

    pub searches: SearchSessions,

    pub gate: Arc<SubscriberGate>,

    pub cache: Option<Arc<dyn ThumbnailCache>>,

    /// Set once teardown ran.
    pub disposed: AtomicBool,

    /// Serializes [`Engine::dispose`].
    dispose_lock: AsyncMutex<()>,
}

/// Outcome of [`Engine::dispose`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposal {
    /// Subscribers remain; nothing was torn down.
    Deferred {
        /// Distinct subscribers still registered.
        subscribers: usize,
    },
    /// The engine was torn down by this call.
    Completed,
    /// An earlier call already tore it down.
    AlreadyDisposed,
}

// ============================================================================
// Engine
// ============================================================================

/// Client for the generation service.
///
/// One engine owns one connection. Clones share it.
#[derive(Clone)]
pub struct Engine {
    /// Shared inner state.
    pub(crate) inner: Arc<EngineInner>,
}

// ============================================================================
// Engine - Display
// ============================================================================

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("endpoint", &self.inner.config.endpoint.as_str())
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Engine - Constructor
// ============================================================================

impl Engine {
    /// Creates a configuration builder for the engine.
    #[inline]
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Wires the engine. Nothing is spawned until [`connect`](Self::connect)
    /// or the first request.
    pub(crate) fn new(config: EngineConfig, cache: Option<Arc<dyn ThumbnailCache>>) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<EngineInner>| {
            let chat = ChatFeed::new(CHAT_CAPACITY);
            let correlator = Arc::new(Correlator::new(config.min_request_interval, chat.clone()));
            let hooks = Self::hooks(&correlator, weak.clone());
            let manager = ConnectionManager::new(config.connection_settings(), hooks);

            EngineInner {
                config,
                manager,
                correlator,
                chat,
                rooms: Mutex::new(FxHashSet::default()),
                searches: SearchSessions::new(SEARCH_CAPACITY),
                gate: Arc::new(SubscriberGate::new()),
                cache,
                disposed: AtomicBool::new(false),
                dispose_lock: AsyncMutex::new(()),
            }
        });

        Self { inner }
    }

    fn hooks(correlator: &Arc<Correlator>, engine: Weak<EngineInner>) -> ManagerHooks {
        let inbound = Arc::clone(correlator);
        let exhausted = Arc::clone(correlator);

        ManagerHooks {
            on_message: Arc::new(move |text: &str| inbound.dispatch(text)),
            on_exhausted: Arc::new(move |attempts| {
                let failed = exhausted.fail_all(|| Error::reconnect_exhausted(attempts));
                warn!(attempts, failed, "Connection lost for good, pending requests failed");
            }),
            on_reconnected: Arc::new(move || {
                if let Some(inner) = engine.upgrade() {
                    let engine = Engine { inner };
                    tokio::spawn(async move { engine.rejoin_rooms().await });
                }
            }),
        }
    }
}

// ============================================================================
// Engine - Public API
// ============================================================================

impl Engine {
    /// Opens the connection if it is not open.
    ///
    /// Requests connect on their own, so calling this is optional. After
    /// automatic reconnection gave up, calling it starts over.
    ///
    /// # Errors
    ///
    /// - [`Error::Disposed`] after disposal
    /// - Connection errors if the attempt fails
    pub async fn connect(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        self.inner.manager.connect().await
    }

    /// Sends a request and waits for a successful response.
    ///
    /// `timeout` defaults to the configured timeout for the request's action.
    ///
    /// # Errors
    ///
    /// - [`Error::Disposed`] after disposal
    /// - [`Error::DuplicateRequest`] if the id is already in flight
    /// - [`Error::RequestTimeout`] if no response arrives in time
    /// - [`Error::Server`] if the service reports a failure
    /// - Connection errors
    pub async fn send(
        &self,
        request: OutboundRequest,
        timeout: Option<Duration>,
    ) -> Result<InboundMessage> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }

        let timeout =
            timeout.unwrap_or_else(|| self.inner.config.timeouts.for_action(request.action()));

        self.inner
            .correlator
            .send(&self.inner.manager, request, timeout)
            .await?
            .into_result()
    }

    /// Current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.manager.state()
    }

    /// State stream. The receiver starts at the current state and only
    /// keeps the latest value.
    #[inline]
    #[must_use]
    pub fn status(&self) -> watch::Receiver<ConnectionState> {
        self.inner.manager.subscribe()
    }

    /// Every state transition from now on, in order, including states that
    /// were left again immediately.
    #[inline]
    #[must_use]
    pub fn state_changes(&self) -> broadcast::Receiver<ConnectionState> {
        self.inner.manager.transitions()
    }

    /// Number of in-flight requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.correlator.pending_count()
    }

    /// Returns `true` once the engine has been torn down.
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// The active configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }
}

// ============================================================================
// Engine - Subscribers
// ============================================================================

impl Engine {
    /// Registers a consumer. Pair with [`remove_subscriber`](Self::remove_subscriber).
    pub fn add_subscriber(&self, id: impl Into<SubscriberId>) {
        self.inner.gate.add(id.into());
    }

    /// Releases one registration of `id`.
    pub fn remove_subscriber(&self, id: impl Into<SubscriberId>) {
        self.inner.gate.remove(&id.into());
    }

    /// Registers a consumer for as long as the guard lives.
    pub fn subscribe(&self, id: impl Into<SubscriberId>) -> SubscriberGuard {
        SubscriberGuard::new(Arc::clone(&self.inner.gate), id.into())
    }

    /// Number of distinct registered consumers.
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.gate.len()
    }
}

// ============================================================================
// Engine - Disposal
// ============================================================================

impl Engine {
    /// Tears the engine down unless consumers remain.
    ///
    /// With subscribers registered this is a no-op and the engine stays
    /// fully usable. Otherwise searches are cancelled, timers and the socket
    /// are closed, and pending requests fail with [`Error::Disposed`]. Every
    /// later operation fails with [`Error::Disposed`].
    pub async fn dispose(&self) -> Disposal {
        let _guard = self.inner.dispose_lock.lock().await;

        if self.is_disposed() {
            return Disposal::AlreadyDisposed;
        }

        let subscribers = self.inner.gate.len();
        if subscribers > 0 {
            debug!(subscribers, "Dispose deferred, subscribers remain");
            return Disposal::Deferred { subscribers };
        }

        self.inner.disposed.store(true, Ordering::SeqCst);
        self.inner.searches.cancel_all();
        self.inner.manager.shutdown();
        let failed = self.inner.correlator.fail_all(|| Error::Disposed);
        self.inner.rooms.lock().clear();

        info!(failed, "Engine disposed");
        Disposal::Completed
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::client::ReconnectConfig;
    use crate::protocol::Action;
    use crate::testing::{MockServer, engine_builder_for, engine_for, reply_ok};

    #[tokio::test]
    async fn test_dispose_is_deferred_while_subscribed() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let engine = engine_for(&server);
        engine.connect().await?;

        engine.add_subscriber("a");
        assert_eq!(engine.dispose().await, Disposal::Deferred { subscribers: 1 });
        assert_eq!(engine.state(), ConnectionState::Connected);
        assert!(!engine.is_disposed());

        engine.remove_subscriber("a");
        assert_eq!(engine.dispose().await, Disposal::Completed);
        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert_eq!(engine.dispose().await, Disposal::AlreadyDisposed);
        Ok(())
    }

    #[tokio::test]
    async fn test_guard_defers_dispose_until_dropped() {
        let server = MockServer::start().await;
        let engine = engine_for(&server);

        let guard = engine.subscribe("screen");
        assert!(matches!(engine.dispose().await, Disposal::Deferred { .. }));

        drop(guard);
        assert_eq!(engine.subscriber_count(), 0);
        assert_eq!(engine.dispose().await, Disposal::Completed);
    }

    #[tokio::test]
    async fn test_dispose_fails_pending_and_later_calls() {
        let server = MockServer::start().await;
        let engine = engine_for(&server);

        let waiting = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.generate_caption("t", "d").await })
        };
        server.wait_for_action("generate_caption").await;
        assert_eq!(engine.pending_count(), 1);

        engine.dispose().await;

        let err = waiting.await.expect("task").expect_err("disposed");
        assert!(matches!(err, Error::Disposed));
        assert_eq!(engine.pending_count(), 0);
        assert!(matches!(engine.connect().await, Err(Error::Disposed)));
        assert!(matches!(engine.join_room("v1").await, Err(Error::Disposed)));
        assert!(!engine.start_search("cats"));
    }

    #[tokio::test]
    async fn test_server_error_is_surfaced_verbatim() {
        let server = MockServer::with_responder(Arc::new(|frame| {
            vec![json!({
                "requestId": frame["requestId"].clone(),
                "success": false,
                "error": "Missing title or description",
            })]
        }))
        .await;
        let engine = engine_for(&server);

        let err = engine
            .send(OutboundRequest::generate_caption("", ""), None)
            .await
            .expect_err("server error");

        assert_eq!(err.to_string(), "Server error: Missing title or description");
        engine.dispose().await;
    }

    #[tokio::test]
    async fn test_explicit_timeout_overrides_default() {
        let server = MockServer::start().await;
        let engine = engine_for(&server);

        let err = engine
            .send(
                OutboundRequest::new(Action::Search, Default::default()),
                Some(Duration::from_millis(50)),
            )
            .await
            .expect_err("timeout");

        assert!(err.is_timeout());
        assert_eq!(engine.pending_count(), 0);
        engine.dispose().await;
    }

    #[tokio::test]
    async fn test_rooms_are_rejoined_after_reconnect() {
        let server = MockServer::with_responder(Arc::new(|frame| match frame["action"].as_str() {
            Some("join_chat") => vec![reply_ok(frame, json!({ "messages": [] }))],
            _ => Vec::new(),
        }))
        .await;
        let engine = engine_for(&server);
        engine.join_room("v1").await.expect("join");

        server.drop_connections();

        for _ in 0..500 {
            if server.frames_for("join_chat").len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(server.frames_for("join_chat").len(), 2);
        assert_eq!(server.connection_count(), 2);
        engine.dispose().await;
    }

    #[tokio::test]
    async fn test_exhaustion_fails_pending_requests() {
        let server = MockServer::start().await;
        let engine = engine_builder_for(&server)
            .reconnect(
                ReconnectConfig::default()
                    .with_base_delay(Duration::from_millis(5))
                    .with_max_attempts(2),
            )
            .build()
            .expect("engine");

        let waiting = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.generate_caption("t", "d").await })
        };
        server.wait_for_action("generate_caption").await;

        server.shutdown().await;

        let err = tokio::time::timeout(Duration::from_secs(10), waiting)
            .await
            .expect("in time")
            .expect("task")
            .expect_err("exhausted");
        assert_eq!(err.to_string(), "Max reconnection attempts reached (2)");
        assert_eq!(engine.state(), ConnectionState::Error);
        engine.dispose().await;
    }

    #[tokio::test]
    async fn test_state_changes_report_every_transition() {
        let server = MockServer::start().await;
        let engine = engine_for(&server);
        let mut changes = engine.state_changes();

        engine.connect().await.expect("connect");
        server.drop_connections();

        let mut walk = vec![ConnectionState::Disconnected];
        let mut connections = 0;
        while connections < 2 {
            let state = tokio::time::timeout(Duration::from_secs(5), changes.recv())
                .await
                .expect("in time")
                .expect("open");
            if state == ConnectionState::Connected {
                connections += 1;
            }
            walk.push(state);
        }
        engine.dispose().await;
        while let Ok(state) = changes.try_recv() {
            walk.push(state);
        }

        for pair in walk.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "illegal {} -> {} in {walk:?}",
                pair[0],
                pair[1]
            );
        }
        assert!(walk.contains(&ConnectionState::Reconnecting));
        assert_eq!(walk.last(), Some(&ConnectionState::Disconnected));
    }
}
