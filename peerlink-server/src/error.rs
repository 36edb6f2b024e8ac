//! Error types for server operations.

use peerlink_core::{EngineError, SessionId};
use thiserror::Error;

/// Error type for server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine failed to start.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The auxiliary HTTP listener could not be bound.
    #[error("HTTP side-channel error: {0}")]
    Http(#[source] std::io::Error),

    /// The builder was not given an engine.
    #[error("no engine binding configured")]
    MissingEngine,

    /// `listen` was called outside a Tokio runtime.
    #[error("listen must be called from within a Tokio runtime")]
    NoRuntime,

    /// `listen` was called on a server that is already listening.
    #[error("server is already listening")]
    AlreadyListening,

    /// Server shutdown.
    #[error("server shutdown")]
    Shutdown,
}

/// Error returned by `send` and recorded per session by `broadcast`.
#[derive(Debug, Error)]
pub enum SendError {
    /// The session is not live.
    #[error("session {0} is not live")]
    NotLive(SessionId),

    /// The engine rejected the write.
    #[error("engine refused send to session {session_id}: {source}")]
    Engine {
        /// Target session.
        session_id: SessionId,
        /// Engine error.
        #[source]
        source: EngineError,
    },

    /// No payloads were given.
    #[error("packet has no payloads")]
    EmptyPacket,

    /// The server is shutting down or stopped.
    #[error("server shutdown")]
    Shutdown,
}

/// Error type for session registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No room for another session.
    #[error("session capacity exhausted ({capacity} live sessions)")]
    Exhausted {
        /// Configured capacity.
        capacity: usize,
    },

    /// The engine reported an ID that is already live.
    #[error("session {0} is already live")]
    AlreadyLive(SessionId),

    /// The engine reported an ID below the configured base.
    #[error("session {id} is below the base id {base}")]
    BelowBase {
        /// Reported ID.
        id: SessionId,
        /// Configured base.
        base: SessionId,
    },
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration text could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// Error message.
        message: String,
    },
}

impl ConfigError {
    /// Creates an invalid configuration error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}
