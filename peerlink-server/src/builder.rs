//! Server builder and main server implementation.

use crate::bridge;
use crate::cache::{MemoryCache, SessionCache};
use crate::config::{HttpConfig, IdleStrategy, ServerConfig};
use crate::error::ServerError;
use crate::handle::{ServerHandle, ServerState, Shared};
use crate::http;
use crate::log::Logger;
use parking_lot::Mutex;
use peerlink_core::{EngineBinding, SessionId};
use std::ops::Deref;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Builder for configuring and creating a server.
#[derive(Default)]
pub struct ServerBuilder {
    config: ServerConfig,
    engine: Option<Box<dyn EngineBinding>>,
    cache: Option<Arc<dyn SessionCache>>,
    logger: Option<Logger>,
}

impl ServerBuilder {
    /// Creates a new server builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the engine port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the first session ID the engine hands out.
    #[must_use]
    pub fn base_session_id(mut self, base: SessionId) -> Self {
        self.config.base_session_id = base;
        self
    }

    /// Sets the maximum number of live sessions.
    #[must_use]
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.config.max_sessions = max;
        self
    }

    /// Sets what the poll loop does after an empty poll.
    #[must_use]
    pub fn idle(mut self, idle: IdleStrategy) -> Self {
        self.config.idle = idle;
        self
    }

    /// Sets the HTTP side-channel settings.
    #[must_use]
    pub fn http(mut self, http: HttpConfig) -> Self {
        self.config.http = http;
        self
    }

    /// Sets the engine binding.
    #[must_use]
    pub fn engine<E: EngineBinding + 'static>(mut self, engine: E) -> Self {
        self.engine = Some(Box::new(engine));
        self
    }

    /// Sets the session cache. Defaults to [`MemoryCache`].
    #[must_use]
    pub fn cache<C: SessionCache + 'static>(mut self, cache: C) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    /// Sets a session cache the host keeps a reference to.
    #[must_use]
    pub fn shared_cache(mut self, cache: Arc<dyn SessionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the application log stream. Defaults to standard error.
    #[must_use]
    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Builds the server.
    ///
    /// # Errors
    /// - [`ServerError::MissingEngine`] if no engine was set
    /// - [`ServerError::Config`] if the configuration is out of range
    /// - [`ServerError::Io`] if the log writer thread cannot start
    pub fn build(self) -> Result<Server, ServerError> {
        self.config.validate()?;
        let engine = self.engine.ok_or(ServerError::MissingEngine)?;
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(MemoryCache::new()) as Arc<dyn SessionCache>);
        let logger = match self.logger {
            Some(logger) => logger,
            None => Logger::stderr()?,
        };

        Ok(Server {
            handle: ServerHandle::new(Shared::new(self.config, engine, cache, logger)),
            poll_task: Mutex::new(None),
            http_task: Mutex::new(None),
        })
    }
}

/// The main server instance.
///
/// Dereferences to its [`ServerHandle`], so handlers are registered and
/// packets sent directly on the server. Dropping the server requests
/// shutdown.
pub struct Server {
    handle: ServerHandle,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    http_task: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Returns a cloneable handle.
    #[must_use]
    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Initializes the engine and starts the poll loop.
    ///
    /// Returns once the engine is up; events are processed on a task of the
    /// current Tokio runtime. On error nothing keeps running and the server
    /// can be asked to listen again.
    ///
    /// # Errors
    /// - [`ServerError::NoRuntime`] outside a Tokio runtime
    /// - [`ServerError::AlreadyListening`] or [`ServerError::Shutdown`] if
    ///   the server is not idle
    /// - [`ServerError::Engine`] if the engine fails to initialize
    /// - [`ServerError::Http`] if the HTTP side-channel cannot bind
    pub fn listen(&self) -> Result<(), ServerError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ServerError::NoRuntime)?;
        let shared = &self.handle.shared;
        shared.begin_listen()?;
        let config = &shared.config;

        {
            let mut engine = shared.engine.lock();
            engine.set_base_session_id(config.base_session_id);
            if let Err(e) = engine.initialize(config.port) {
                shared.set_state(ServerState::Idle);
                tracing::error!("Engine failed to initialize on port {}: {}", config.port, e);
                return Err(e.into());
            }
        }
        tracing::info!("Engine listening on port {}", config.port);
        shared
            .logger
            .log(format_args!("ENet server listening on port {}", config.port));

        if config.http.enabled {
            match http::bind(config.http.bind_addr()) {
                Ok(listener) => {
                    let addr = listener.local_addr().ok();
                    *shared.http_addr.lock() = addr;
                    tracing::info!("HTTP side-channel listening on {:?}", addr);
                    shared.logger.log(format_args!(
                        "HTTP server listening on {}",
                        addr.unwrap_or_else(|| config.http.bind_addr())
                    ));
                    let task = runtime.spawn(http::serve(listener, self.handle.clone()));
                    *self.http_task.lock() = Some(task);
                }
                Err(e) => {
                    shared.engine.lock().shutdown();
                    shared.set_state(ServerState::Idle);
                    tracing::error!("HTTP side-channel failed to bind: {}", e);
                    return Err(ServerError::Http(e));
                }
            }
        }

        let task = runtime.spawn(bridge::run(self.handle.clone()));
        *self.poll_task.lock() = Some(task);
        shared.logger.log("Event dispatch installed, polling");
        Ok(())
    }

    /// Listens and waits until the server stops.
    ///
    /// # Errors
    /// As [`listen`](Self::listen).
    pub async fn run(&self) -> Result<(), ServerError> {
        self.listen()?;
        self.wait().await;
        Ok(())
    }

    /// Waits until the poll loop and the HTTP side-channel have finished.
    pub async fn wait(&self) {
        let poll_task = self.poll_task.lock().take();
        if let Some(task) = poll_task
            && let Err(e) = task.await
        {
            tracing::error!("Poll loop task failed: {}", e);
        }
        let http_task = self.http_task.lock().take();
        if let Some(task) = http_task
            && let Err(e) = task.await
        {
            tracing::error!("HTTP task failed: {}", e);
        }
    }

    /// Requests shutdown and waits for the server to stop.
    ///
    /// Events the engine has not yet delivered are discarded, and live
    /// sessions are dropped without `disconnect` events.
    pub async fn shutdown(&self) {
        self.handle.shutdown();
        self.wait().await;
    }
}

impl Deref for Server {
    type Target = ServerHandle;

    fn deref(&self) -> &ServerHandle {
        &self.handle
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Server").field(&self.handle).finish()
    }
}
