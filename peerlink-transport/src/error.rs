//! Error types for transport operations.

use peerlink_core::EngineError;
use thiserror::Error;

/// Error type for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation timed out.
    #[error("timed out")]
    Timeout,

    /// Frame too large.
    #[error("frame too large: {size} bytes exceeds maximum {max} bytes")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Invalid frame.
    #[error("invalid frame: {message}")]
    InvalidFrame {
        /// Error message.
        message: String,
    },

    /// The remote side did not behave as the protocol expects.
    #[error("handshake failed: {message}")]
    Handshake {
        /// Error message.
        message: String,
    },
}

impl TransportError {
    /// Creates a frame too large error.
    pub fn frame_too_large(size: usize, max: usize) -> Self {
        Self::FrameTooLarge { size, max }
    }

    /// Creates an invalid frame error.
    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::InvalidFrame {
            message: message.into(),
        }
    }

    /// Creates a handshake error.
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }
}

impl From<TransportError> for EngineError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(e) => EngineError::Io(e),
            invalid @ TransportError::InvalidFrame { .. } => {
                EngineError::malformed(invalid.to_string())
            }
            other => EngineError::rejected(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_engine_error() {
        let err: EngineError = TransportError::invalid_frame("unknown opcode 0x7f").into();
        assert!(matches!(err, EngineError::Malformed { .. }));
        assert_eq!(
            err.to_string(),
            "malformed input: invalid frame: unknown opcode 0x7f"
        );

        let err: EngineError = TransportError::frame_too_large(70_000, 65_536).into();
        assert!(matches!(err, EngineError::Rejected { .. }));

        let io = std::io::Error::other("boom");
        let err: EngineError = TransportError::Io(io).into();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
