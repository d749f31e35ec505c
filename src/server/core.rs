//! Server core
//!
//! The lifecycle controller tying the client registry, the dispatch layer,
//! and the external transport engine / event loop together. One `Server`
//! value is one independent context; nothing here is process-global.

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::client::{ClientId, ClientRegistry, UserData};
use crate::dispatch::Dispatcher;
use crate::error::{DispatchError, InitError, Rejected, SendError, ServerError};
use crate::server::config::ServerConfig;
use crate::transport::{EventLoop, ServerHandler, SessionRef, Transport};

/// Poll budget handed to each event-loop turn.
pub const SERVICE_INTERVAL: Duration = Duration::from_millis(5);

/// How long `destroy` waits for a still-running loop to settle after
/// signalling stop, before tearing down unconditionally.
const DESTROY_GRACE: Duration = Duration::from_millis(200);
const GRACE_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    Initialized,
    Running,
    Stopping,
    Destroyed,
}

/// A relay server context.
///
/// `run` blocks the event-loop thread; `stop`, the dispatch surface, and
/// the registry queries are safe from any thread. The engine-facing
/// `session_*` methods are invoked by the transport engine on the loop
/// thread and never propagate errors back across that boundary.
pub struct Server {
    registry: Arc<ClientRegistry>,
    dispatcher: Dispatcher,
    transport: Arc<dyn Transport>,
    event_loop: Arc<dyn EventLoop>,
    handler: Arc<dyn ServerHandler>,
    config: ServerConfig,
    running: AtomicBool,
    state: Mutex<LifecycleState>,
}

impl Server {
    /// Initializes a server context: normalizes the configuration, binds
    /// the transport engine, and builds the registry and dispatcher.
    pub fn init(
        config: ServerConfig,
        transport: Arc<dyn Transport>,
        event_loop: Arc<dyn EventLoop>,
        handler: Arc<dyn ServerHandler>,
    ) -> Result<Self, InitError> {
        let config = config.normalized();

        transport
            .open(&config.host, config.port)
            .map_err(InitError::TransportUnavailable)?;
        info!(
            "Server bound to {} (max {} clients)",
            config.endpoint(),
            config.max_clients
        );

        let registry = Arc::new(ClientRegistry::new(config.max_clients));
        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&transport));

        Ok(Self {
            registry,
            dispatcher,
            transport,
            event_loop,
            handler,
            config,
            running: AtomicBool::new(false),
            state: Mutex::new(LifecycleState::Initialized),
        })
    }

    /// Drives the event loop until `stop` is observed.
    ///
    /// Blocking; must be called from the thread that owns the event loop,
    /// and only once per context.
    pub fn run(&self) -> Result<(), ServerError> {
        {
            let mut state = self.state.lock();
            if *state != LifecycleState::Initialized {
                return Err(ServerError::InvalidState(format!(
                    "run() requires an initialized server, state is {:?}",
                    *state
                )));
            }
            *state = LifecycleState::Running;
            self.running.store(true, Ordering::SeqCst);
        }
        info!("Serving on {}", self.config.endpoint());

        let result = loop {
            if !self.running.load(Ordering::SeqCst) {
                break Ok(());
            }
            if let Err(e) = self.event_loop.turn(SERVICE_INTERVAL) {
                error!("Event loop turn failed: {}", e);
                self.running.store(false, Ordering::SeqCst);
                break Err(ServerError::Transport(e));
            }
        };

        let mut state = self.state.lock();
        if *state == LifecycleState::Running {
            *state = LifecycleState::Stopping;
        }
        info!("Event loop exited");
        result
    }

    /// Signals the server to stop. Callable from any thread, including
    /// signal-handler context: only an atomic store plus the loop's wake
    /// primitive. Frees nothing and does not block; `run` returns once
    /// the loop observes the flag.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.event_loop.wake();
    }

    /// Tears the context down. Idempotent.
    ///
    /// If the loop is still running this stops it and waits a bounded
    /// grace period for `run` to settle, then unconditionally
    /// force-removes every remaining client (discarding scheduled sends)
    /// and shuts the transport engine down. Teardown is best-effort and
    /// never fails observably.
    pub fn destroy(&self) {
        {
            let mut state = self.state.lock();
            if *state == LifecycleState::Destroyed {
                return;
            }
            if *state == LifecycleState::Initialized {
                // Loop never started; nothing to wait for.
                *state = LifecycleState::Stopping;
            }
        }

        if self.running.load(Ordering::SeqCst) {
            self.stop();
            let deadline = Instant::now() + DESTROY_GRACE;
            while Instant::now() < deadline {
                if *self.state.lock() != LifecycleState::Running {
                    break;
                }
                thread::sleep(GRACE_POLL);
            }
        }

        let dropped = self.registry.clear();
        if dropped > 0 {
            info!("Force-removed {} client(s) at teardown", dropped);
        }
        self.transport.shutdown();
        *self.state.lock() = LifecycleState::Destroyed;
        info!("Server context destroyed");
    }

    // --------------------
    // Engine-facing events
    // --------------------

    /// A connection completed its handshake. Admits it and returns the
    /// handle the engine should carry as the session's user context; a
    /// rejection tells the engine to close the connection.
    ///
    /// The connect notification fires after the record is durably
    /// inserted and the registry lock is released, so the handler already
    /// observes the new client.
    pub fn session_established(&self, session: SessionRef) -> Result<ClientId, Rejected> {
        match self.registry.admit(session) {
            Ok(id) => {
                info!(
                    "Client {} connected on {} ({}/{} clients)",
                    id,
                    session,
                    self.registry.count(),
                    self.registry.capacity()
                );
                self.handler.on_connect(&id);
                Ok(id)
            }
            Err(e) => {
                warn!("Refusing connection on {}: {}", session, e);
                Err(e)
            }
        }
    }

    /// Payload received from a client. Forwarded to the handler while the
    /// handle still resolves; silently dropped otherwise.
    pub fn session_received(&self, id: &ClientId, payload: &[u8]) {
        if !self.registry.contains(id) {
            debug!("Dropping {} bytes from unknown client {}", payload.len(), id);
            return;
        }
        self.handler.on_message(id, payload);
    }

    /// The engine can accept bytes for this session: flush the staged
    /// frame, if any.
    pub fn session_writable(&self, id: &ClientId) {
        self.dispatcher.flush_writable(id);
    }

    /// The connection closed. Unlinks the record exactly once; only the
    /// call that unlinked notifies the handler, after the lock is
    /// released.
    pub fn session_closed(&self, id: &ClientId) {
        if self.registry.remove(id) {
            info!(
                "Client {} disconnected ({} clients)",
                id,
                self.registry.count()
            );
            self.handler.on_disconnect(id);
        }
    }

    // --------------------
    // Dispatch surface
    // --------------------

    /// Schedules one payload for one client. See `Dispatcher::send_to`.
    pub fn send_to(&self, id: &ClientId, payload: &[u8]) -> Result<(), SendError> {
        self.dispatcher.send_to(id, payload)
    }

    /// Best-effort fan-out to every client; returns the scheduled count.
    pub fn broadcast(&self, payload: &[u8]) -> usize {
        self.dispatcher.broadcast(payload)
    }

    /// Fan-out excluding one handle; empty payloads are a distinct error.
    pub fn broadcast_except(
        &self,
        exclude: Option<&ClientId>,
        payload: &[u8],
    ) -> Result<usize, DispatchError> {
        self.dispatcher.broadcast_except(exclude, payload)
    }

    // --------------------
    // Registry queries
    // --------------------

    pub fn count(&self) -> usize {
        self.registry.count()
    }

    pub fn snapshot(&self) -> Vec<ClientId> {
        self.registry.snapshot()
    }

    pub fn set_user_data(&self, id: &ClientId, data: Option<UserData>) -> bool {
        self.registry.set_user_data(id, data)
    }

    pub fn user_data(&self, id: &ClientId) -> Option<UserData> {
        self.registry.user_data(id)
    }

    /// Shared handle to the registry, for handlers that need richer
    /// queries than the delegated surface offers.
    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use std::sync::atomic::AtomicUsize;

    struct StubTransport {
        fail_open: bool,
        shutdowns: AtomicUsize,
    }

    impl StubTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fail_open: false,
                shutdowns: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail_open: true,
                shutdowns: AtomicUsize::new(0),
            })
        }
    }

    impl Transport for StubTransport {
        fn open(&self, host: &str, port: u16) -> Result<(), TransportError> {
            if self.fail_open {
                Err(TransportError::Unavailable(format!(
                    "address in use: {}:{}",
                    host, port
                )))
            } else {
                Ok(())
            }
        }

        fn write(&self, _session: &SessionRef, _payload: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }

        fn request_writable(&self, _session: &SessionRef) -> Result<(), TransportError> {
            Ok(())
        }

        fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct StubLoop;

    impl EventLoop for StubLoop {
        fn turn(&self, timeout: Duration) -> Result<(), TransportError> {
            thread::sleep(timeout.min(Duration::from_millis(1)));
            Ok(())
        }

        fn wake(&self) {}
    }

    struct RecordingHandler {
        events: Mutex<Vec<String>>,
        registry: Mutex<Option<Arc<ClientRegistry>>>,
    }

    impl RecordingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
                registry: Mutex::new(None),
            })
        }
    }

    impl ServerHandler for RecordingHandler {
        fn on_message(&self, client: &ClientId, payload: &[u8]) {
            self.events
                .lock()
                .push(format!("rx {} {}", client, payload.len()));
        }

        fn on_connect(&self, client: &ClientId) {
            let visible = self
                .registry
                .lock()
                .as_ref()
                .map(|r| r.count())
                .unwrap_or(0);
            self.events.lock().push(format!("connect {} seen={}", client, visible));
        }

        fn on_disconnect(&self, client: &ClientId) {
            let visible = self
                .registry
                .lock()
                .as_ref()
                .map(|r| r.count())
                .unwrap_or(0);
            self.events
                .lock()
                .push(format!("disconnect {} seen={}", client, visible));
        }
    }

    fn make_server(max_clients: usize, handler: Arc<RecordingHandler>) -> Server {
        let config = ServerConfig {
            max_clients,
            ..ServerConfig::default()
        };
        let server = Server::init(config, StubTransport::new(), Arc::new(StubLoop), handler.clone())
            .unwrap();
        *handler.registry.lock() = Some(server.registry());
        server
    }

    #[test]
    fn init_propagates_transport_unavailability() {
        let result = Server::init(
            ServerConfig::default(),
            StubTransport::failing(),
            Arc::new(StubLoop),
            RecordingHandler::new(),
        );
        assert!(matches!(result, Err(InitError::TransportUnavailable(_))));
    }

    #[test]
    fn zero_max_clients_falls_back_to_default_capacity() {
        let server = make_server(0, RecordingHandler::new());
        assert_eq!(
            server.registry().capacity(),
            crate::server::config::DEFAULT_MAX_CLIENTS
        );
        assert_eq!(
            server.config().max_clients,
            crate::server::config::DEFAULT_MAX_CLIENTS
        );
    }

    #[test]
    fn stop_from_foreign_thread_unblocks_run() {
        let server = Arc::new(make_server(4, RecordingHandler::new()));

        let runner = {
            let server = Arc::clone(&server);
            thread::spawn(move || server.run())
        };
        thread::sleep(Duration::from_millis(30));

        let stopped_at = Instant::now();
        server.stop();
        runner.join().unwrap().unwrap();
        assert!(stopped_at.elapsed() < DESTROY_GRACE);
    }

    #[test]
    fn run_twice_is_an_invalid_state() {
        let server = Arc::new(make_server(4, RecordingHandler::new()));

        let runner = {
            let server = Arc::clone(&server);
            thread::spawn(move || server.run())
        };
        thread::sleep(Duration::from_millis(20));
        server.stop();
        runner.join().unwrap().unwrap();

        assert!(matches!(server.run(), Err(ServerError::InvalidState(_))));
    }

    #[test]
    fn destroy_is_idempotent_and_forces_removal() {
        let transport = StubTransport::new();
        let server = Server::init(
            ServerConfig::default(),
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(StubLoop),
            RecordingHandler::new(),
        )
        .unwrap();

        server.session_established(SessionRef::new(1)).unwrap();
        server.session_established(SessionRef::new(2)).unwrap();
        assert_eq!(server.count(), 2);

        server.destroy();
        assert_eq!(server.count(), 0);
        server.destroy();
        assert_eq!(transport.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn connect_notification_sees_the_new_client() {
        let handler = RecordingHandler::new();
        let server = make_server(4, handler.clone());

        let id = server.session_established(SessionRef::new(1)).unwrap();

        let events = handler.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], format!("connect {} seen=1", id));
    }

    #[test]
    fn capacity_rejection_leaves_registry_untouched() {
        let server = make_server(1, RecordingHandler::new());
        server.session_established(SessionRef::new(1)).unwrap();

        let refused = server.session_established(SessionRef::new(2));
        assert!(matches!(refused, Err(Rejected::CapacityExceeded { .. })));
        assert_eq!(server.count(), 1);
    }

    #[test]
    fn close_unlinks_and_notifies_exactly_once() {
        let handler = RecordingHandler::new();
        let server = make_server(4, handler.clone());
        let id = server.session_established(SessionRef::new(1)).unwrap();

        server.session_closed(&id);
        server.session_closed(&id);

        let events = handler.events.lock();
        let disconnects: Vec<_> = events.iter().filter(|e| e.starts_with("disconnect")).collect();
        assert_eq!(disconnects.len(), 1);
        // The handler observes a registry the client is already absent from.
        assert_eq!(disconnects[0], &format!("disconnect {} seen=0", id));
    }

    #[test]
    fn received_payloads_only_reach_the_handler_while_registered() {
        let handler = RecordingHandler::new();
        let server = make_server(4, handler.clone());
        let id = server.session_established(SessionRef::new(1)).unwrap();

        server.session_received(&id, b"abc");
        server.session_closed(&id);
        server.session_received(&id, b"late");

        let events = handler.events.lock();
        assert!(events.contains(&format!("rx {} 3", id)));
        assert!(!events.iter().any(|e| e == &format!("rx {} 4", id)));
    }
}
