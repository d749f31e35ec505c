//! Client registry
//!
//! Owns every connected client's record and serializes all structural
//! mutation behind one lock. The same lock covers each record's transmit
//! fields, so senders on worker threads and the event-loop thread never
//! race on them. The lock is never held across a call into the transport
//! engine or into application notification handlers.

use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::client::record::{ClientId, ClientRecord, UserData};
use crate::error::Rejected;
use crate::transport::SessionRef;

/// Registry for tracking active clients
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientId, ClientRecord>>,
    capacity: usize,
    next_seq: AtomicU64,
}

impl ClientRegistry {
    /// Creates a registry admitting at most `capacity` clients.
    /// Zero-capacity normalization happens at the configuration layer.
    pub fn new(capacity: usize) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            capacity,
            next_seq: AtomicU64::new(0),
        }
    }

    /// Admits a new session, returning its freshly generated handle.
    ///
    /// Refuses with `Rejected::CapacityExceeded` when full; admission
    /// never evicts an existing client. The record is durably inserted
    /// before this returns, so a caller notifying application code can
    /// let it observe the new client in `count`/`snapshot`.
    pub fn admit(&self, session: SessionRef) -> Result<ClientId, Rejected> {
        let mut clients = self.clients.lock();

        if clients.len() >= self.capacity {
            return Err(Rejected::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        clients
            .try_reserve(1)
            .map_err(|_| Rejected::AllocationFailed)?;

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let id = ClientId::generate(seq);
        clients.insert(id.clone(), ClientRecord::new(id.clone(), session));

        debug!(
            "Admitted client {} on {} ({}/{} clients)",
            id,
            session,
            clients.len(),
            self.capacity
        );
        Ok(id)
    }

    /// Removes a client, returning whether this call unlinked it.
    ///
    /// Idempotent: removing an already-removed handle is a no-op
    /// returning `false`. Any dynamic transmit buffer is released with
    /// the record.
    pub fn remove(&self, id: &ClientId) -> bool {
        let removed = self.clients.lock().remove(id);
        if removed.is_some() {
            debug!("Removed client {}", id);
        }
        removed.is_some()
    }

    /// Current number of registered clients.
    pub fn count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Configured admission limit.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the handle currently resolves.
    pub fn contains(&self, id: &ClientId) -> bool {
        self.clients.lock().contains_key(id)
    }

    /// Point-in-time copy of all registered handles.
    ///
    /// Safe to iterate without the lock; entries may go stale as clients
    /// disconnect, so holders must re-check before use.
    pub fn snapshot(&self) -> Vec<ClientId> {
        self.clients.lock().keys().cloned().collect()
    }

    /// Admission timestamp of a client, if still registered.
    pub fn connect_time(&self, id: &ClientId) -> Option<SystemTime> {
        self.clients.lock().get(id).map(|c| c.connect_time())
    }

    /// Engine session token of a client, if still registered.
    pub fn session_of(&self, id: &ClientId) -> Option<SessionRef> {
        self.clients.lock().get(id).map(|c| c.session())
    }

    /// Caller-owned data attached to a client, if any.
    pub fn user_data(&self, id: &ClientId) -> Option<UserData> {
        self.clients.lock().get(id).and_then(|c| c.user_data())
    }

    /// Attaches caller-owned data to a client. Returns `false` if the
    /// handle no longer resolves.
    pub fn set_user_data(&self, id: &ClientId, data: Option<UserData>) -> bool {
        match self.clients.lock().get_mut(id) {
            Some(client) => {
                client.set_user_data(data);
                true
            }
            None => false,
        }
    }

    /// Runs `f` on one client's record under the registry lock.
    ///
    /// This is the only mutation path for transmit fields. `f` must not
    /// call into the transport engine or block.
    pub fn with_client_mut<T>(
        &self,
        id: &ClientId,
        f: impl FnOnce(&mut ClientRecord) -> T,
    ) -> Option<T> {
        self.clients.lock().get_mut(id).map(f)
    }

    /// Runs `f` on every client's record in one critical section.
    pub fn for_each_client_mut(&self, mut f: impl FnMut(&mut ClientRecord)) {
        for client in self.clients.lock().values_mut() {
            f(client);
        }
    }

    /// Force-removes every client, returning how many were dropped.
    /// Teardown path: pending buffers are discarded, not flushed.
    pub fn clear(&self) -> usize {
        let mut clients = self.clients.lock();
        let dropped = clients.len();
        clients.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    fn session(n: u64) -> SessionRef {
        SessionRef::new(n)
    }

    #[test]
    fn count_tracks_admissions_and_removals() {
        let registry = ClientRegistry::new(8);
        assert_eq!(registry.count(), 0);

        let a = registry.admit(session(1)).unwrap();
        let b = registry.admit(session(2)).unwrap();
        assert_eq!(registry.count(), 2);

        assert!(registry.remove(&a));
        assert_eq!(registry.count(), 1);
        assert!(registry.contains(&b));
        assert!(!registry.contains(&a));
    }

    #[test]
    fn admission_beyond_capacity_is_refused() {
        let registry = ClientRegistry::new(2);
        let a = registry.admit(session(1)).unwrap();
        let _b = registry.admit(session(2)).unwrap();

        let c = registry.admit(session(3));
        assert!(matches!(c, Err(Rejected::CapacityExceeded { capacity: 2 })));
        assert_eq!(registry.count(), 2);

        // Freeing a slot lets the next admission through.
        assert!(registry.remove(&a));
        registry.admit(session(3)).unwrap();
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = ClientRegistry::new(4);
        let id = registry.admit(session(1)).unwrap();

        assert!(registry.remove(&id));
        assert!(!registry.remove(&id));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn ids_are_unique_under_concurrent_admission() {
        let registry = Arc::new(ClientRegistry::new(1024));
        let mut handles = Vec::new();

        for t in 0..8u64 {
            let registry = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                let mut ids = Vec::new();
                for n in 0..100 {
                    ids.push(registry.admit(session(t * 1000 + n)).unwrap());
                }
                ids
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id.as_str().to_string()));
            }
        }
        assert_eq!(seen.len(), 800);
        assert_eq!(registry.count(), 800);
    }

    #[test]
    fn snapshot_is_a_stale_safe_copy() {
        let registry = ClientRegistry::new(4);
        let a = registry.admit(session(1)).unwrap();
        let b = registry.admit(session(2)).unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);

        // A handle in the snapshot may already be invalid by use time.
        registry.remove(&a);
        assert!(snapshot.contains(&a));
        assert!(!registry.contains(&a));
        assert!(registry.contains(&b));
    }

    #[test]
    fn clear_drops_everything() {
        let registry = ClientRegistry::new(4);
        registry.admit(session(1)).unwrap();
        registry.admit(session(2)).unwrap();

        assert_eq!(registry.clear(), 2);
        assert_eq!(registry.count(), 0);
        assert_eq!(registry.clear(), 0);
    }

    #[test]
    fn session_and_connect_time_resolve_while_registered() {
        let registry = ClientRegistry::new(4);
        let id = registry.admit(session(42)).unwrap();

        assert_eq!(registry.session_of(&id), Some(session(42)));
        assert!(registry.connect_time(&id).is_some());

        registry.remove(&id);
        assert!(registry.session_of(&id).is_none());
        assert!(registry.connect_time(&id).is_none());
    }
}
