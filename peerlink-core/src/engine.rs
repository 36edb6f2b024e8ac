//! The contract a transport engine must satisfy to be driven by the server.

use crate::error::EngineError;
use crate::event::RawEvent;
use crate::id::SessionId;
use bytes::Bytes;

/// Narrow synchronous interface to a reliable-transport engine.
///
/// Every call must return promptly: `poll` services pending network I/O
/// once and reports at most one event. The engine owns session numbering;
/// the server seeds it with [`set_base_session_id`](Self::set_base_session_id)
/// before [`initialize`](Self::initialize).
pub trait EngineBinding: Send {
    /// Binds the engine to `port` and starts accepting peers.
    ///
    /// # Errors
    /// Returns an error if the engine cannot start, e.g. the port is taken.
    fn initialize(&mut self, port: u16) -> Result<(), EngineError>;

    /// Sets the first session ID the engine hands out.
    fn set_base_session_id(&mut self, base: SessionId);

    /// Services the network once and reports the next event, or
    /// [`RawEvent::None`].
    ///
    /// # Errors
    /// Returns an error if the engine could not make sense of its input.
    /// The caller skips the tick and polls again.
    fn poll(&mut self) -> Result<RawEvent, EngineError>;

    /// Queues `payloads` for `session_id` on `channel`.
    ///
    /// # Errors
    /// Returns an error if the session is unknown to the engine or the write
    /// failed.
    fn send(
        &mut self,
        session_id: SessionId,
        channel: u8,
        payloads: &[Bytes],
    ) -> Result<(), EngineError>;

    /// Drops a peer without reporting a disconnect for it.
    ///
    /// Used to refuse a connection the server has no room for.
    fn disconnect(&mut self, session_id: SessionId);

    /// Releases every engine resource. Further calls are not expected.
    fn shutdown(&mut self);
}

impl<E: EngineBinding + ?Sized> EngineBinding for Box<E> {
    fn initialize(&mut self, port: u16) -> Result<(), EngineError> {
        (**self).initialize(port)
    }

    fn set_base_session_id(&mut self, base: SessionId) {
        (**self).set_base_session_id(base);
    }

    fn poll(&mut self) -> Result<RawEvent, EngineError> {
        (**self).poll()
    }

    fn send(
        &mut self,
        session_id: SessionId,
        channel: u8,
        payloads: &[Bytes],
    ) -> Result<(), EngineError> {
        (**self).send(session_id, channel, payloads)
    }

    fn disconnect(&mut self, session_id: SessionId) {
        (**self).disconnect(session_id);
    }

    fn shutdown(&mut self) {
        (**self).shutdown();
    }
}
