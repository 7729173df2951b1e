//! WebSocket transport session and event loop.
//!
//! A [`TransportSession`] owns one physical socket. Opening it spawns a tokio
//! task that handles:
//!
//! - Incoming text frames (handed to the message handler)
//! - Outgoing frames queued by [`TransportSession::send`]
//! - Closure, reported exactly once through the close handler

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Inbound text frame callback.
///
/// Called on the session task for every text frame, in arrival order.
pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Called once when the event loop exits.
pub type CloseHandler = Box<dyn FnOnce(CloseReason) + Send>;

// ============================================================================
// CloseReason
// ============================================================================

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The remote end closed the socket or the stream ended.
    Remote,
    /// Read or write failed.
    Failed(String),
    /// [`TransportSession::close`] was called or the session was dropped.
    Local,
}

// ============================================================================
// SessionCommand
// ============================================================================

/// Internal commands for the event loop.
enum SessionCommand {
    /// Write a text frame.
    Send(String),
    /// Close the socket.
    Close,
}

// ============================================================================
// TransportSession
// ============================================================================

/// Handle to one open WebSocket.
///
/// Dropping the handle closes the socket.
pub struct TransportSession {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<SessionCommand>,
}

impl TransportSession {
    /// Connects to `endpoint` and spawns the event loop.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the handshake does not finish in time
    /// - [`Error::WebSocket`] if the connection is refused or the upgrade fails
    pub async fn open(
        endpoint: &Url,
        connect_timeout: Duration,
        on_message: MessageHandler,
        on_close: CloseHandler,
    ) -> Result<Self> {
        let (ws_stream, _response) = timeout(connect_timeout, connect_async(endpoint.as_str()))
            .await
            .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))??;

        debug!(%endpoint, "WebSocket handshake completed");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::run_event_loop(
            ws_stream, command_rx, on_message, on_close,
        ));

        Ok(Self { command_tx })
    }

    /// Queues a text frame for sending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the event loop has exited.
    pub fn send(&self, frame: String) -> Result<()> {
        self.command_tx
            .send(SessionCommand::Send(frame))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Asks the event loop to close the socket. Safe to call twice.
    pub fn close(&self) {
        let _ = self.command_tx.send(SessionCommand::Close);
    }

    /// Returns `true` while the event loop is running.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.command_tx.is_closed()
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        ws_stream: Socket,
        mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
        on_message: MessageHandler,
        on_close: CloseHandler,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let reason = loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            trace!(len = text.len(), "Frame received");
                            on_message(text.as_str());
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break CloseReason::Remote;
                        }

                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket read failed");
                            break CloseReason::Failed(e.to_string());
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break CloseReason::Remote;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(SessionCommand::Send(frame)) => {
                            if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                                warn!(error = %e, "WebSocket write failed");
                                break CloseReason::Failed(e.to_string());
                            }
                            trace!("Frame sent");
                        }

                        Some(SessionCommand::Close) | None => {
                            let _ = ws_write.close().await;
                            break CloseReason::Local;
                        }
                    }
                }
            }
        };

        // Later sends fail fast instead of queueing into a dead loop
        command_rx.close();

        debug!(?reason, "Event loop terminated");
        on_close(reason);
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Tests
// ============================================================================
