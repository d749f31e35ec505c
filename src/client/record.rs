//! Module `record`
//!
//! Defines the `ClientId` handle and the `ClientRecord` owned by the
//! registry for each connected session: identity, admission timestamp,
//! the engine's session token, opaque caller data, and transmit state.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::transmit::TransmitState;
use crate::transport::SessionRef;

/// Opaque, globally unique client identifier.
///
/// Generated at admission from a monotonic counter plus a time component;
/// never reused for the lifetime of a registry. Snapshots hand these out,
/// and they may go stale: every operation taking a `ClientId` checks that
/// it still resolves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Builds an identifier from the registry's admission sequence number.
    pub(crate) fn generate(seq: u64) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        ClientId(format!("{:06}-{:x}", seq, millis))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque caller-owned data attached to a client. The registry stores and
/// returns it without ever interpreting it.
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Represents one connected session owned by the registry.
///
/// The record exists in the registry exactly as long as the transport
/// engine considers the connection open; the engine holds only the
/// non-owning `SessionRef` used to route events back here.
pub struct ClientRecord {
    id: ClientId,
    session: SessionRef,
    connect_time: SystemTime,
    user_data: Option<UserData>,
    tx: TransmitState,
}

impl ClientRecord {
    pub(crate) fn new(id: ClientId, session: SessionRef) -> Self {
        Self {
            id,
            session,
            connect_time: SystemTime::now(),
            user_data: None,
            tx: TransmitState::new(),
        }
    }

    /// Returns the client's unique identifier.
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// Returns the engine session token this record routes to.
    pub fn session(&self) -> SessionRef {
        self.session
    }

    /// Returns the timestamp captured at admission.
    pub fn connect_time(&self) -> SystemTime {
        self.connect_time
    }

    /// Returns the caller-owned data attached to this client, if any.
    pub fn user_data(&self) -> Option<UserData> {
        self.user_data.clone()
    }

    /// Attaches caller-owned data, replacing any existing value.
    pub fn set_user_data(&mut self, data: Option<UserData>) {
        self.user_data = data;
    }

    /// Transmit state; touched only while the registry lock is held.
    pub fn tx_mut(&mut self) -> &mut TransmitState {
        &mut self.tx
    }
}
