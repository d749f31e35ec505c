//! Error types
//!
//! Defines domain-specific error types for each layer of the relay server.

use std::fmt;

use crate::client::ClientId;
use crate::transport::TransportError;

/// Admission errors returned by the client registry
#[derive(Debug, Clone)]
pub enum Rejected {
    /// The registry is full; the connection must be refused, never an
    /// existing client evicted.
    CapacityExceeded { capacity: usize },
    /// Storage for the client record could not be obtained.
    AllocationFailed,
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejected::CapacityExceeded { capacity } => {
                write!(f, "Client limit reached ({} clients)", capacity)
            }
            Rejected::AllocationFailed => write!(f, "Failed to allocate client record"),
        }
    }
}

impl std::error::Error for Rejected {}

/// Send-time errors returned by the buffered transmit path
#[derive(Debug, Clone)]
pub enum SendError {
    /// The client already has one scheduled, not-yet-flushed payload.
    /// Hard backpressure: the send is rejected, not queued.
    Busy,
    /// The handle no longer resolves to a registered client.
    InvalidClient(ClientId),
    /// The dynamic transmit buffer could not be allocated.
    AllocationFailed,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Busy => write!(f, "Client has a pending send"),
            SendError::InvalidClient(id) => write!(f, "Client not found: {}", id),
            SendError::AllocationFailed => write!(f, "Failed to allocate transmit buffer"),
        }
    }
}

impl std::error::Error for SendError {}

/// Fan-out errors returned by the dispatch layer
#[derive(Debug, Clone)]
pub enum DispatchError {
    /// The broadcast payload was empty. Distinct from scheduling zero
    /// sends so call sites can tell a bad call from an empty registry.
    EmptyPayload,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::EmptyPayload => write!(f, "Broadcast payload is empty"),
        }
    }
}

impl std::error::Error for DispatchError {}

/// Startup errors returned by `Server::init`
#[derive(Debug, Clone)]
pub enum InitError {
    /// The transport context could not be created; carries the engine's
    /// reason (e.g. port already bound).
    TransportUnavailable(TransportError),
    /// The configuration file could not be loaded or parsed.
    Config(String),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::TransportUnavailable(e) => write!(f, "Transport unavailable: {}", e),
            InitError::Config(reason) => write!(f, "Invalid configuration: {}", reason),
        }
    }
}

impl std::error::Error for InitError {}

/// General relay server error that encompasses all error types
#[derive(Debug, Clone)]
pub enum ServerError {
    Rejected(Rejected),
    Send(SendError),
    Dispatch(DispatchError),
    Init(InitError),
    Transport(TransportError),
    /// A lifecycle operation was invoked in the wrong state.
    InvalidState(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Rejected(e) => write!(f, "Admission error: {}", e),
            ServerError::Send(e) => write!(f, "Send error: {}", e),
            ServerError::Dispatch(e) => write!(f, "Dispatch error: {}", e),
            ServerError::Init(e) => write!(f, "Init error: {}", e),
            ServerError::Transport(e) => write!(f, "Transport error: {}", e),
            ServerError::InvalidState(msg) => write!(f, "Invalid server state: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {}

// Implement conversions from specific errors to ServerError
impl From<Rejected> for ServerError {
    fn from(error: Rejected) -> Self {
        ServerError::Rejected(error)
    }
}

impl From<SendError> for ServerError {
    fn from(error: SendError) -> Self {
        ServerError::Send(error)
    }
}

impl From<DispatchError> for ServerError {
    fn from(error: DispatchError) -> Self {
        ServerError::Dispatch(error)
    }
}

impl From<InitError> for ServerError {
    fn from(error: InitError) -> Self {
        ServerError::Init(error)
    }
}

impl From<TransportError> for ServerError {
    fn from(error: TransportError) -> Self {
        ServerError::Transport(error)
    }
}
