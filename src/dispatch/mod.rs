//! Dispatch layer
//!
//! Send-to-one and best-effort fan-out built on the registry and the
//! per-client transmit buffers. Staging happens in one critical section;
//! engine calls (writability requests, payload writes) always happen with
//! the registry lock released.

use log::{debug, warn};
use std::sync::Arc;

use crate::client::{ClientId, ClientRegistry};
use crate::error::{DispatchError, SendError};
use crate::transport::{SessionRef, Transport};

/// Routes outbound traffic from any thread onto per-client buffers and
/// flushes them when the engine signals writability.
pub struct Dispatcher {
    registry: Arc<ClientRegistry>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ClientRegistry>, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    /// Schedules one payload for one client.
    ///
    /// `SendError::Busy` is a hard backpressure signal: the previous
    /// payload has not flushed yet and this layer never queues. Retry
    /// policy, if any, belongs to the caller.
    pub fn send_to(&self, id: &ClientId, payload: &[u8]) -> Result<(), SendError> {
        let staged = self
            .registry
            .with_client_mut(id, |client| {
                client.tx_mut().stage(payload).map(|()| client.session())
            })
            .ok_or_else(|| SendError::InvalidClient(id.clone()))?;
        let session = staged?;

        self.poke_writable(id, &session);
        Ok(())
    }

    /// Fan-out to every registered client. Busy clients and per-client
    /// allocation failures are skipped, not errors; returns how many
    /// sends were scheduled. No atomicity across clients.
    pub fn broadcast(&self, payload: &[u8]) -> usize {
        self.fan_out(None, payload)
    }

    /// Fan-out to every registered client except one.
    ///
    /// An unregistered or absent `exclude` simply excludes nobody.
    /// Rejects empty payloads with a sentinel error so callers can
    /// distinguish a bad call from zero clients scheduled.
    pub fn broadcast_except(
        &self,
        exclude: Option<&ClientId>,
        payload: &[u8],
    ) -> Result<usize, DispatchError> {
        if payload.is_empty() {
            return Err(DispatchError::EmptyPayload);
        }
        Ok(self.fan_out(exclude, payload))
    }

    /// The engine reported a session writable: hand its staged frame off.
    ///
    /// Clears the pending slot under the lock, writes with the lock
    /// released. Fire-and-forget: write failures are logged, never
    /// surfaced, and nothing is retried.
    pub fn flush_writable(&self, id: &ClientId) {
        let flush = self.registry.with_client_mut(id, |client| {
            client
                .tx_mut()
                .take_frame()
                .map(|frame| (frame, client.session()))
        });

        match flush {
            Some(Some((frame, session))) => {
                if let Err(e) = self.transport.write(&session, frame.payload()) {
                    warn!("Write to client {} failed: {}", id, e);
                }
            }
            Some(None) => debug!("Spurious writable event for client {}", id),
            None => debug!("Writable event for unknown client {}", id),
        }
    }

    fn fan_out(&self, exclude: Option<&ClientId>, payload: &[u8]) -> usize {
        let mut scheduled: Vec<(ClientId, SessionRef)> = Vec::new();

        self.registry.for_each_client_mut(|client| {
            if exclude == Some(client.id()) {
                return;
            }
            match client.tx_mut().stage(payload) {
                Ok(()) => scheduled.push((client.id().clone(), client.session())),
                Err(SendError::Busy) => {
                    debug!("Broadcast skipping busy client {}", client.id());
                }
                Err(e) => warn!("Broadcast skipping client {}: {}", client.id(), e),
            }
        });

        for (id, session) in &scheduled {
            self.poke_writable(id, session);
        }
        scheduled.len()
    }

    fn poke_writable(&self, id: &ClientId, session: &SessionRef) {
        // A failed request means the session is going away; the close
        // event will reclaim the staged buffer with the record.
        if let Err(e) = self.transport.request_writable(session) {
            warn!("Writable request for client {} failed: {}", id, e);
        }
    }
}
