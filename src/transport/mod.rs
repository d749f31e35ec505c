//! Transport engine boundary
//!
//! Defines the traits through which the server consumes an external
//! WebSocket transport engine and its single-threaded event loop, plus the
//! handler trait through which connection events reach application code.
//! The crate never performs framing, handshakes, or TLS itself.

use std::fmt;
use std::time::Duration;

use crate::client::ClientId;

/// Opaque session token minted by the transport engine.
///
/// The registry stores one per client to route writability requests and
/// payload writes back to the engine. It carries no ownership: the engine
/// remains responsible for the underlying connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionRef(u64);

impl SessionRef {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Errors produced by a transport engine implementation.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// The engine context could not be created (e.g. port already bound).
    Unavailable(String),
    /// The session referenced by an operation is no longer open.
    SessionClosed,
    /// A payload write was accepted by this layer but refused by the engine.
    WriteFailed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Unavailable(reason) => {
                write!(f, "Transport unavailable: {}", reason)
            }
            TransportError::SessionClosed => write!(f, "Session is closed"),
            TransportError::WriteFailed(reason) => write!(f, "Write failed: {}", reason),
        }
    }
}

impl std::error::Error for TransportError {}

/// External WebSocket transport engine.
///
/// Implementations own the wire protocol end to end. All methods except
/// `request_writable` are invoked from the event-loop thread;
/// `request_writable` must be safe to call from any thread, since senders
/// schedule traffic from worker threads.
pub trait Transport: Send + Sync {
    /// Binds the listening context for the given endpoint.
    fn open(&self, host: &str, port: u16) -> Result<(), TransportError>;

    /// Writes one complete payload to a session.
    ///
    /// Invoked on the event-loop thread, from inside the writable event for
    /// that session. Delivery is fire-and-forget at this layer.
    fn write(&self, session: &SessionRef, payload: &[u8]) -> Result<(), TransportError>;

    /// Asks the engine to emit a writable event for a session once the
    /// connection can accept bytes. Safe to call from foreign threads.
    fn request_writable(&self, session: &SessionRef) -> Result<(), TransportError>;

    /// Tears down the engine context. Best-effort: failures are the
    /// engine's to log, never surfaced here.
    fn shutdown(&self);
}

/// External single-threaded event loop runtime.
pub trait EventLoop: Send + Sync {
    /// Runs one poll/dispatch cycle, blocking the calling thread for at
    /// most `timeout`.
    fn turn(&self, timeout: Duration) -> Result<(), TransportError>;

    /// Wakes a `turn` blocked on another thread. Must be non-blocking and
    /// async-signal-safe; `Server::stop` relies on both.
    fn wake(&self);
}

/// Application-side connection event handler.
///
/// Replaces the raw callback pointers of a C-style configuration surface
/// with one typed object. `on_message` is the only required event;
/// connect/disconnect notifications default to no-ops.
///
/// Notifications are never delivered while the registry lock is held, so
/// handlers may freely call back into the server (count, snapshot, send).
pub trait ServerHandler: Send + Sync {
    /// A payload arrived from a connected client.
    fn on_message(&self, client: &ClientId, payload: &[u8]);

    /// A client was admitted. The registry already contains it.
    fn on_connect(&self, _client: &ClientId) {}

    /// A client was removed. The registry no longer contains it.
    fn on_disconnect(&self, _client: &ClientId) {}
}
