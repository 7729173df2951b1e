//! Connection lifecycle, heartbeat and reconnection.
//!
//! The [`ConnectionManager`] owns the [`ConnectionState`] and the current
//! [`TransportSession`]. It is the only component that opens or closes
//! sockets.
//!
//! # Critical Sections
//!
//! Every connection attempt, manual or automatic, runs under one async mutex,
//! so concurrent `connect()` calls coalesce into a single physical attempt.
//! Close notifications from the event loop are processed under the same lock.
//!
//! # Background Tasks
//!
//! | Task | Lifetime |
//! |------|----------|
//! | heartbeat | started on every successful connection, aborted on loss |
//! | reconnect | at most one at a time, ends on success or exhaustion |
//!
//! Both tasks hold a `Weak` reference and stop once the manager is dropped.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::OutboundRequest;

use super::policy::ReconnectPolicy;
use super::session::{CloseReason, MessageHandler, TransportSession};
use super::state::ConnectionState;

// ============================================================================
// Types
// ============================================================================

/// Buffered transitions per lagging observer.
const TRANSITION_CAPACITY: usize = 64;

/// Called with the attempt count when automatic reconnection gives up.
pub type ExhaustedHandler = Arc<dyn Fn(u32) + Send + Sync>;

/// Called after a connection is re-established following a loss.
pub type ReconnectedHandler = Arc<dyn Fn() + Send + Sync>;

// ============================================================================
// ConnectionSettings
// ============================================================================

/// Settings the manager needs from the engine configuration.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// WebSocket endpoint.
    pub endpoint: Url,
    /// Handshake timeout.
    pub connect_timeout: Duration,
    /// Keepalive period.
    pub heartbeat_interval: Duration,
    /// Reconnect backoff base.
    pub reconnect_base_delay: Duration,
    /// Automatic reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
}

// ============================================================================
// ManagerHooks
// ============================================================================

/// Callbacks wiring the manager to the layers above it.
#[derive(Clone)]
pub struct ManagerHooks {
    /// Every inbound text frame.
    pub on_message: MessageHandler,
    /// Reconnection exhausted.
    pub on_exhausted: ExhaustedHandler,
    /// Connection restored after a loss.
    ///
    /// Runs while the connect lock is held, so it must not wait on
    /// [`ConnectionManager::connect`]. Spawn instead.
    pub on_reconnected: ReconnectedHandler,
}

impl ManagerHooks {
    /// Hooks that ignore everything.
    #[must_use]
    pub fn noop() -> Self {
        Self {
            on_message: Arc::new(|_| {}),
            on_exhausted: Arc::new(|_| {}),
            on_reconnected: Arc::new(|| {}),
        }
    }
}

// ============================================================================
// Channel
// ============================================================================

/// What the request layer needs from the connection.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Returns `true` if frames can be transmitted right now.
    fn is_connected(&self) -> bool;

    /// Connects if not connected, waiting for the attempt to settle.
    async fn ensure_connected(&self) -> Result<()>;

    /// Hands a serialized frame to the socket.
    fn transmit(&self, frame: String) -> Result<()>;
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Drives the connection state machine on top of [`TransportSession`].
pub struct ConnectionManager {
    settings: ConnectionSettings,
    hooks: ManagerHooks,

    /// Current state; receivers always see the latest value.
    state_tx: watch::Sender<ConnectionState>,

    /// Every transition, in order.
    transitions_tx: broadcast::Sender<ConnectionState>,

    /// Current socket, if any.
    session: Mutex<Option<TransportSession>>,

    /// Bumped whenever a session is replaced or torn down deliberately, so
    /// close notifications from stale sessions are ignored.
    generation: AtomicU64,

    /// Serializes connection attempts and close handling.
    connect_lock: AsyncMutex<()>,

    policy: Mutex<ReconnectPolicy>,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,

    /// Set once any connection has succeeded.
    ever_connected: AtomicBool,

    /// Shutdown flag.
    shutdown: AtomicBool,
}

// ============================================================================
// ConnectionManager - Constructor
// ============================================================================

impl ConnectionManager {
    /// Creates a disconnected manager. No I/O happens until [`connect`](Self::connect).
    #[must_use]
    pub fn new(settings: ConnectionSettings, hooks: ManagerHooks) -> Arc<Self> {
        let policy = ReconnectPolicy::new(
            settings.reconnect_base_delay,
            settings.max_reconnect_attempts,
        );
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (transitions_tx, _) = broadcast::channel(TRANSITION_CAPACITY);

        Arc::new(Self {
            settings,
            hooks,
            state_tx,
            transitions_tx,
            session: Mutex::new(None),
            generation: AtomicU64::new(0),
            connect_lock: AsyncMutex::new(()),
            policy: Mutex::new(policy),
            heartbeat_task: Mutex::new(None),
            reconnect_task: Mutex::new(None),
            ever_connected: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        })
    }
}

// ============================================================================
// ConnectionManager - Public API
// ============================================================================

impl ConnectionManager {
    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Subscribes to state changes. The receiver starts at the current state.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Subscribes to every transition from now on.
    ///
    /// Unlike [`subscribe`](Self::subscribe), intermediate states set back to
    /// back are all delivered.
    #[inline]
    #[must_use]
    pub fn transitions(&self) -> broadcast::Receiver<ConnectionState> {
        self.transitions_tx.subscribe()
    }

    /// Returns `true` if a socket is open and the state is `Connected`.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected && self.session.lock().is_some()
    }

    /// Returns the reconnect attempts made since the last success.
    #[inline]
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.policy.lock().attempts()
    }

    /// Returns the endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.settings.endpoint
    }

    /// Establishes a connection unless one is already open.
    ///
    /// Concurrent callers coalesce: whoever gets the lock first makes the
    /// attempt, the others observe its outcome. Calling this after automatic
    /// reconnection gave up resets the policy and starts over.
    ///
    /// # Errors
    ///
    /// - [`Error::Disposed`] after [`shutdown`](Self::shutdown)
    /// - [`Error::Connection`] / [`Error::ConnectionTimeout`] if the attempt fails
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        {
            let mut policy = self.policy.lock();
            if policy.is_exhausted() && self.state() == ConnectionState::Error {
                debug!("Manual connect after exhaustion, resetting policy");
                policy.reset();
            }
        }
        self.attempt().await
    }

    /// Sends a frame on the current socket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if no socket is open.
    pub fn transmit(&self, frame: String) -> Result<()> {
        match self.session.lock().as_ref() {
            Some(session) => session.send(frame),
            None => Err(Error::ConnectionClosed),
        }
    }

    /// Tears everything down: timers, socket, state.
    ///
    /// Idempotent. After this every [`connect`](Self::connect) fails with
    /// [`Error::Disposed`].
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        self.generation.fetch_add(1, Ordering::SeqCst);
        self.stop_heartbeat();
        if let Some(task) = self.reconnect_task.lock().take() {
            task.abort();
        }
        if let Some(session) = self.session.lock().take() {
            session.close();
        }
        self.set_state(ConnectionState::Disconnected);

        info!(endpoint = %self.settings.endpoint, "Connection manager shut down");
    }
}

// ============================================================================
// ConnectionManager - Connection Attempts
// ============================================================================

impl ConnectionManager {
    /// One attempt under the connect lock.
    async fn attempt(self: &Arc<Self>) -> Result<()> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(Error::Disposed);
        }

        let _guard = self.connect_lock.lock().await;

        if self.shutdown.load(Ordering::SeqCst) {
            return Err(Error::Disposed);
        }
        if self.is_connected() {
            trace!("Already connected, attempt coalesced");
            return Ok(());
        }

        self.establish().await
    }

    /// Opens a new session. Caller holds the connect lock.
    async fn establish(self: &Arc<Self>) -> Result<()> {
        self.set_state(ConnectionState::Connecting);
        self.stop_heartbeat();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(stale) = self.session.lock().take() {
            debug!("Closing stale session");
            stale.close();
        }

        let weak = Arc::downgrade(self);
        let on_close = Box::new(move |reason: CloseReason| {
            if let Some(manager) = weak.upgrade() {
                manager.on_session_closed(generation, reason);
            }
        });

        let opened = TransportSession::open(
            &self.settings.endpoint,
            self.settings.connect_timeout,
            Arc::clone(&self.hooks.on_message),
            on_close,
        )
        .await;

        match opened {
            Ok(session) => {
                if self.shutdown.load(Ordering::SeqCst) {
                    session.close();
                    return Err(Error::Disposed);
                }

                *self.session.lock() = Some(session);
                self.policy.lock().reset();
                self.set_state(ConnectionState::Connected);
                self.start_heartbeat();

                info!(endpoint = %self.settings.endpoint, "Connected");

                if self.ever_connected.swap(true, Ordering::SeqCst) {
                    (self.hooks.on_reconnected)();
                }
                Ok(())
            }
            Err(e) => {
                warn!(endpoint = %self.settings.endpoint, error = %e, "Connection attempt failed");
                self.set_state(ConnectionState::Error);
                self.schedule_reconnect();
                Err(e)
            }
        }
    }

    /// Event loop exit notification.
    ///
    /// Runs on a fresh task so it can take the connect lock.
    fn on_session_closed(self: Arc<Self>, generation: u64, reason: CloseReason) {
        tokio::spawn(async move {
            let _guard = self.connect_lock.lock().await;

            if self.shutdown.load(Ordering::SeqCst)
                || self.generation.load(Ordering::SeqCst) != generation
            {
                trace!(generation, "Ignoring close of stale session");
                return;
            }

            self.session.lock().take();
            self.stop_heartbeat();

            match reason {
                CloseReason::Failed(message) => {
                    warn!(error = %message, "Connection lost");
                    self.set_state(ConnectionState::Error);
                }
                CloseReason::Remote | CloseReason::Local => {
                    info!("Connection closed");
                    self.set_state(ConnectionState::Disconnected);
                }
            }

            self.schedule_reconnect();
        });
    }
}

// ============================================================================
// ConnectionManager - Reconnection
// ============================================================================

impl ConnectionManager {
    /// Starts the reconnect loop unless connected or already reconnecting.
    fn schedule_reconnect(self: &Arc<Self>) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }
        if matches!(
            self.state(),
            ConnectionState::Connected | ConnectionState::Reconnecting
        ) {
            return;
        }

        let mut slot = self.reconnect_task.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        self.set_state(ConnectionState::Reconnecting);
        *slot = Some(tokio::spawn(Self::reconnect_loop(Arc::downgrade(self))));
    }

    /// Claims attempts from the policy until one succeeds or none are left.
    async fn reconnect_loop(manager: Weak<Self>) {
        loop {
            let Some(this) = manager.upgrade() else {
                return;
            };
            if this.shutdown.load(Ordering::SeqCst) {
                return;
            }

            let next = this.policy.lock().next_attempt();
            let Some((attempt, delay)) = next else {
                if this.is_connected() {
                    return;
                }
                let attempts = this.policy.lock().attempts();
                this.set_state(ConnectionState::Error);
                warn!(attempts, "Max reconnection attempts reached");
                (this.hooks.on_exhausted)(attempts);
                return;
            };

            this.set_state(ConnectionState::Reconnecting);
            info!(
                attempt = attempt + 1,
                max = this.settings.max_reconnect_attempts,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );
            drop(this);

            sleep(delay).await;

            let Some(this) = manager.upgrade() else {
                return;
            };
            if this.attempt().await.is_ok() {
                return;
            }
        }
    }
}

// ============================================================================
// ConnectionManager - Heartbeat
// ============================================================================

impl ConnectionManager {
    fn start_heartbeat(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let period = self.settings.heartbeat_interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                manager.send_heartbeat();
            }
        });

        if let Some(previous) = self.heartbeat_task.lock().replace(task) {
            previous.abort();
        }
    }

    fn stop_heartbeat(&self) {
        if let Some(task) = self.heartbeat_task.lock().take() {
            task.abort();
        }
    }

    /// Sent only while connected, never queued.
    fn send_heartbeat(&self) {
        if self.state() != ConnectionState::Connected {
            trace!("Heartbeat skipped, not connected");
            return;
        }

        let sent = OutboundRequest::heartbeat()
            .to_frame()
            .and_then(|frame| self.transmit(frame));

        match sent {
            Ok(()) => trace!("Heartbeat sent"),
            Err(e) => debug!(error = %e, "Heartbeat not sent"),
        }
    }
}

// ============================================================================
// ConnectionManager - State
// ============================================================================

impl ConnectionManager {
    /// Emits only on an actual, legal change. Illegal transitions are
    /// dropped and the state is left as it was.
    fn set_state(&self, next: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            if !current.can_transition_to(next) {
                warn!(from = %current, to = %next, "Illegal state transition ignored");
                return false;
            }
            debug!(from = %current, to = %next, "Connection state changed");
            *current = next;
            let _ = self.transitions_tx.send(next);
            true
        });
    }
}

// ============================================================================
// Channel impl
// ============================================================================

#[async_trait]
impl Channel for Arc<ConnectionManager> {
    fn is_connected(&self) -> bool {
        ConnectionManager::is_connected(self)
    }

    async fn ensure_connected(&self) -> Result<()> {
        ConnectionManager::connect(self).await
    }

    fn transmit(&self, frame: String) -> Result<()> {
        ConnectionManager::transmit(self, frame)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.heartbeat_task.get_mut().take() {
            task.abort();
        }
        if let Some(task) = self.reconnect_task.get_mut().take() {
            task.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
