//! Error types for peerlink core operations.

use crate::id::SessionId;
use thiserror::Error;

/// Core error type for peerlink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A packet was built without any payload.
    #[error("packet has no payloads")]
    EmptyPacket,

    /// Engine failure.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Error type reported by an [`EngineBinding`](crate::EngineBinding).
#[derive(Debug, Error)]
pub enum EngineError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine was used before `initialize`.
    #[error("engine not initialized")]
    NotInitialized,

    /// `initialize` was called twice.
    #[error("engine already initialized")]
    AlreadyInitialized,

    /// The engine has no peer for this session.
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    /// The engine received something it could not decode.
    #[error("malformed input: {message}")]
    Malformed {
        /// Error message.
        message: String,
    },

    /// The engine refused the operation.
    #[error("rejected: {message}")]
    Rejected {
        /// Error message.
        message: String,
    },
}

impl EngineError {
    /// Creates a malformed input error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates a rejection error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

/// Result type alias for peerlink core operations.
pub type Result<T> = std::result::Result<T, Error>;
