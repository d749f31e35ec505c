//! ws-relay
//!
//! A multi-client WebSocket session registry and buffered dispatch layer.
//! Sits above an externally supplied transport engine (framing, TLS,
//! handshake) and single-threaded event loop, both consumed through the
//! traits in [`transport`]. Tracks connected clients, gives each a safe
//! single-in-flight send path, and fans out broadcasts without races
//! between the event-loop thread and application worker threads.

pub mod client;
pub mod dispatch;
pub mod error;
pub mod server;
pub mod transmit;
pub mod transport;
pub mod utils;

pub use client::{ClientId, ClientRegistry};
pub use error::{DispatchError, InitError, Rejected, SendError, ServerError};
pub use server::{Server, ServerConfig};
pub use transport::{EventLoop, ServerHandler, SessionRef, Transport, TransportError};
