//! Server handle: subscription, send and broadcast surface.

use crate::cache::SessionCache;
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{SendError, ServerError};
use crate::handler::{EventHandler, HandlerId, HandlerResult};
use crate::log::Logger;
use crate::registry::{Session, SessionRegistry};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use peerlink_core::{EngineBinding, Event, EventKind, Packet, SessionId, Target};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

/// Lifecycle state of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Built, not listening yet.
    Idle,
    /// Engine initialized, poll loop running.
    Listening,
    /// Shut down; no further events.
    Stopped,
}

impl ServerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Listening,
            _ => Self::Stopped,
        }
    }

    /// Returns the lowercase state name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the bridge counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServerStats {
    /// Normalized events handed to the dispatcher.
    pub events_dispatched: u64,
    /// Engine events dropped because they referenced an unknown or
    /// conflicting session.
    pub anomalies: u64,
    /// Connections refused because the registry was full.
    pub refused_connections: u64,
    /// Handler invocations that failed or panicked.
    pub handler_failures: u64,
    /// Polls that returned an engine error.
    pub poll_errors: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) dispatched: AtomicU64,
    pub(crate) anomalies: AtomicU64,
    pub(crate) refused: AtomicU64,
    pub(crate) handler_failures: AtomicU64,
    pub(crate) poll_errors: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ServerStats {
        ServerStats {
            events_dispatched: self.dispatched.load(Ordering::Relaxed),
            anomalies: self.anomalies.load(Ordering::Relaxed),
            refused_connections: self.refused.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            poll_errors: self.poll_errors.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of a broadcast.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    /// Sessions the engine accepted the packet for.
    pub delivered: Vec<SessionId>,
    /// Sessions the send failed for.
    pub failed: Vec<(SessionId, SendError)>,
}

impl BroadcastReport {
    /// Returns true if no send failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// State shared by the server, its handles and the poll loop.
pub(crate) struct Shared {
    pub(crate) config: ServerConfig,
    pub(crate) engine: Mutex<Box<dyn EngineBinding>>,
    pub(crate) registry: RwLock<SessionRegistry>,
    pub(crate) dispatcher: Dispatcher<ServerHandle>,
    pub(crate) cache: Arc<dyn SessionCache>,
    pub(crate) logger: Logger,
    pub(crate) counters: Counters,
    pub(crate) shutdown: CancellationToken,
    pub(crate) http_addr: Mutex<Option<SocketAddr>>,
    state: AtomicU8,
}

impl Shared {
    pub(crate) fn new(
        config: ServerConfig,
        engine: Box<dyn EngineBinding>,
        cache: Arc<dyn SessionCache>,
        logger: Logger,
    ) -> Self {
        let registry = SessionRegistry::new(config.base_session_id, config.max_sessions);
        Self {
            config,
            engine: Mutex::new(engine),
            registry: RwLock::new(registry),
            dispatcher: Dispatcher::new(),
            cache,
            logger,
            counters: Counters::default(),
            shutdown: CancellationToken::new(),
            http_addr: Mutex::new(None),
            state: AtomicU8::new(ServerState::Idle as u8),
        }
    }

    pub(crate) fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ServerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Moves `Idle` to `Listening`.
    pub(crate) fn begin_listen(&self) -> Result<(), ServerError> {
        match self.state.compare_exchange(
            ServerState::Idle as u8,
            ServerState::Listening as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(current) => match ServerState::from_u8(current) {
                ServerState::Listening => Err(ServerError::AlreadyListening),
                _ => Err(ServerError::Shutdown),
            },
        }
    }
}

/// Cloneable handle to a server.
///
/// Handlers receive one by reference; hosts get one from
/// [`Server::handle`](crate::Server::handle).
#[derive(Clone)]
pub struct ServerHandle {
    pub(crate) shared: Arc<Shared>,
}

impl ServerHandle {
    pub(crate) fn new(shared: Shared) -> Self {
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Registers a handler for one event kind.
    ///
    /// Handlers of a kind run in registration order. Registering while the
    /// server listens is allowed and applies from the next event.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&ServerHandle, &Event) -> HandlerResult + Send + Sync + 'static,
    {
        self.shared.dispatcher.on(kind, handler)
    }

    /// Registers a `connect` handler.
    pub fn on_connect<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&ServerHandle, SessionId) -> HandlerResult + Send + Sync + 'static,
    {
        self.on(EventKind::Connect, move |server, event| {
            handler(server, event.session_id())
        })
    }

    /// Registers a `data` handler.
    pub fn on_data<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&ServerHandle, SessionId, &Bytes) -> HandlerResult + Send + Sync + 'static,
    {
        self.on(EventKind::Data, move |server, event| match event {
            Event::Data {
                session_id,
                payload,
                ..
            } => handler(server, *session_id, payload),
            _ => Ok(()),
        })
    }

    /// Registers a `disconnect` handler.
    pub fn on_disconnect<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&ServerHandle, SessionId) -> HandlerResult + Send + Sync + 'static,
    {
        self.on(EventKind::Disconnect, move |server, event| {
            handler(server, event.session_id())
        })
    }

    /// Registers an [`EventHandler`] for every kind.
    ///
    /// Returns the connect, data and disconnect registrations.
    pub fn attach<H: EventHandler + 'static>(&self, handler: H) -> [HandlerId; 3] {
        let handler = Arc::new(handler);

        let h = Arc::clone(&handler);
        let connect = self.on_connect(move |server, id| h.on_connect(server, id));

        let h = Arc::clone(&handler);
        let data = self.on(EventKind::Data, move |server, event| match event {
            Event::Data {
                session_id,
                channel,
                payload,
            } => h.on_data(server, *session_id, *channel, payload),
            _ => Ok(()),
        });

        let disconnect =
            self.on_disconnect(move |server, id| handler.on_disconnect(server, id));

        [connect, data, disconnect]
    }

    /// Removes a handler. Returns false if it was not registered.
    pub fn off(&self, id: HandlerId) -> bool {
        self.shared.dispatcher.off(id)
    }

    /// Sends one payload to a live session.
    ///
    /// # Errors
    /// - [`SendError::NotLive`] if the session is not live
    /// - [`SendError::Engine`] if the engine rejects the write
    /// - [`SendError::Shutdown`] once shutdown began
    pub fn send(
        &self,
        session_id: SessionId,
        channel: u8,
        payload: impl Into<Bytes>,
    ) -> Result<(), SendError> {
        let packet = Packet::new(Target::Session(session_id), channel, payload);
        self.deliver(session_id, &packet)
    }

    /// Sends several payloads to a live session in one engine call.
    ///
    /// # Errors
    /// As [`send`](Self::send), plus [`SendError::EmptyPacket`] if
    /// `payloads` is empty.
    pub fn send_packets(
        &self,
        session_id: SessionId,
        channel: u8,
        payloads: Vec<Bytes>,
    ) -> Result<(), SendError> {
        let packet = Packet::with_payloads(Target::Session(session_id), channel, payloads)
            .map_err(|_| SendError::EmptyPacket)?;
        self.deliver(session_id, &packet)
    }

    /// Sends one payload to every live session except `exclude`.
    ///
    /// A failure for one session does not stop delivery to the others.
    pub fn broadcast(
        &self,
        channel: u8,
        payload: impl Into<Bytes>,
        exclude: Option<SessionId>,
    ) -> BroadcastReport {
        let packet = Packet::new(Target::Broadcast { exclude }, channel, payload);
        let mut report = BroadcastReport::default();

        for session_id in self.session_ids() {
            if !packet.target().includes(session_id) {
                continue;
            }
            match self.deliver(session_id, &packet) {
                Ok(()) => report.delivered.push(session_id),
                Err(e) => {
                    tracing::warn!("Broadcast to session {} failed: {}", session_id, e);
                    report.failed.push((session_id, e));
                }
            }
        }
        report
    }

    fn deliver(&self, session_id: SessionId, packet: &Packet) -> Result<(), SendError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(SendError::Shutdown);
        }
        if !self.is_live(session_id) {
            return Err(SendError::NotLive(session_id));
        }
        self.shared
            .engine
            .lock()
            .send(session_id, packet.channel(), packet.payloads())
            .map_err(|source| SendError::Engine { session_id, source })
    }

    /// Writes a timestamped line to the log stream without waiting for it.
    pub fn log(&self, message: impl fmt::Display) {
        self.shared.logger.log(message);
    }

    /// Returns the log stream.
    #[must_use]
    pub fn logger(&self) -> &Logger {
        &self.shared.logger
    }

    /// Returns the session cache.
    #[must_use]
    pub fn cache(&self) -> &dyn SessionCache {
        self.shared.cache.as_ref()
    }

    /// Returns true if `session_id` is live.
    #[must_use]
    pub fn is_live(&self, session_id: SessionId) -> bool {
        self.shared.registry.read().is_live(session_id)
    }

    /// Returns a live session.
    #[must_use]
    pub fn session(&self, session_id: SessionId) -> Option<Session> {
        self.shared.registry.read().get(session_id)
    }

    /// Returns all live session IDs in ascending order.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.shared.registry.read().session_ids()
    }

    /// Returns the number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.shared.registry.read().count()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        self.shared.state()
    }

    /// Returns the bridge counters.
    #[must_use]
    pub fn stats(&self) -> ServerStats {
        self.shared.counters.snapshot()
    }

    /// Returns the address of the HTTP side-channel, if it is running.
    #[must_use]
    pub fn http_addr(&self) -> Option<SocketAddr> {
        *self.shared.http_addr.lock()
    }

    /// Requests shutdown.
    ///
    /// The poll loop stops before its next poll. Safe to call from a
    /// handler. Use [`Server::shutdown`](crate::Server::shutdown) to also
    /// wait for the loop to finish.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
        // Nothing will run the loop's stop path for a server that never listened.
        let _ = self.shared.state.compare_exchange(
            ServerState::Idle as u8,
            ServerState::Stopped as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Returns true once shutdown was requested.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }
}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle")
            .field("port", &self.shared.config.port)
            .field("state", &self.state())
            .field("sessions", &self.session_count())
            .finish()
    }
}
