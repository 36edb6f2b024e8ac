//! Event handler traits.

use crate::handle::ServerHandle;
use bytes::Bytes;
use peerlink_core::SessionId;

/// Error a handler may return. Logged by the dispatcher, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Identifies one registered handler, for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub(crate) u64);

impl HandlerId {
    /// Returns the raw registration number.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Trait for handling every event kind with one object.
///
/// Register it with [`ServerHandle::attach`]; each method defaults to doing
/// nothing.
pub trait EventHandler: Send + Sync {
    /// Called when a session is established.
    ///
    /// # Arguments
    /// * `server` - Handle for sending and cache access
    /// * `session_id` - ID of the new session
    fn on_connect(&self, _server: &ServerHandle, _session_id: SessionId) -> HandlerResult {
        Ok(())
    }

    /// Called when a session sends a payload.
    ///
    /// # Arguments
    /// * `server` - Handle for sending and cache access
    /// * `session_id` - ID of the sending session
    /// * `channel` - Engine channel the payload arrived on
    /// * `payload` - Payload bytes, valid for this call; clone to keep
    fn on_data(
        &self,
        _server: &ServerHandle,
        _session_id: SessionId,
        _channel: u8,
        _payload: &Bytes,
    ) -> HandlerResult {
        Ok(())
    }

    /// Called when a session ends, before its ID can be reused.
    ///
    /// # Arguments
    /// * `server` - Handle for sending and cache access
    /// * `session_id` - ID of the ended session
    fn on_disconnect(&self, _server: &ServerHandle, _session_id: SessionId) -> HandlerResult {
        Ok(())
    }
}
