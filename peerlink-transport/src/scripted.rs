//! In-memory engine that replays scripted events.
//!
//! The engine is moved into the server; the [`ScriptHandle`] stays with the
//! test to feed events and inspect what the server sent.

use bytes::Bytes;
use parking_lot::Mutex;
use peerlink_core::{EngineBinding, EngineError, RawEvent, SessionId};
use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;

/// One `send` call the engine accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    /// Target session.
    pub session_id: SessionId,
    /// Channel.
    pub channel: u8,
    /// Payloads in the call.
    pub payloads: Vec<Bytes>,
}

#[derive(Debug, Default)]
struct Script {
    initialized_on: Option<u16>,
    shut_down: bool,
    base: Option<SessionId>,
    init_failure: Option<String>,
    events: VecDeque<Result<RawEvent, String>>,
    sent: Vec<SentPacket>,
    failing: HashSet<SessionId>,
    dropped: Vec<SessionId>,
    polls: u64,
}

/// Test-side handle of a [`ScriptedEngine`].
#[derive(Debug, Clone, Default)]
pub struct ScriptHandle {
    inner: Arc<Mutex<Script>>,
}

impl ScriptHandle {
    /// Queues a raw event.
    pub fn push(&self, event: RawEvent) {
        self.inner.lock().events.push_back(Ok(event));
    }

    /// Queues several raw events in order.
    pub fn push_all(&self, events: impl IntoIterator<Item = RawEvent>) {
        let mut script = self.inner.lock();
        script.events.extend(events.into_iter().map(Ok));
    }

    /// Queues a poll that fails with a malformed-input error.
    pub fn push_error(&self, message: impl Into<String>) {
        self.inner.lock().events.push_back(Err(message.into()));
    }

    /// Queues `connect(session_id)`.
    pub fn connect(&self, session_id: SessionId) {
        self.connect_from(session_id, None);
    }

    /// Queues `connect(session_id)` with a peer address.
    pub fn connect_from(&self, session_id: SessionId, peer: Option<SocketAddr>) {
        self.push(RawEvent::Connect { session_id, peer });
    }

    /// Queues a payload from `session_id`.
    pub fn receive(&self, session_id: SessionId, channel: u8, payload: impl Into<Bytes>) {
        self.push(RawEvent::Receive {
            session_id,
            channel,
            payload: payload.into(),
        });
    }

    /// Queues `disconnect(session_id)`.
    pub fn disconnect(&self, session_id: SessionId) {
        self.push(RawEvent::Disconnect { session_id });
    }

    /// Makes every later `send` to `session_id` fail.
    pub fn fail_sends_to(&self, session_id: SessionId) {
        self.inner.lock().failing.insert(session_id);
    }

    /// Makes `initialize` fail with `message`.
    pub fn fail_initialize(&self, message: impl Into<String>) {
        self.inner.lock().init_failure = Some(message.into());
    }

    /// Returns every accepted `send` call.
    #[must_use]
    pub fn sent(&self) -> Vec<SentPacket> {
        self.inner.lock().sent.clone()
    }

    /// Returns the accepted `send` calls for one session.
    #[must_use]
    pub fn sent_to(&self, session_id: SessionId) -> Vec<SentPacket> {
        self.inner
            .lock()
            .sent
            .iter()
            .filter(|p| p.session_id == session_id)
            .cloned()
            .collect()
    }

    /// Returns the sessions the server asked the engine to drop.
    #[must_use]
    pub fn dropped(&self) -> Vec<SessionId> {
        self.inner.lock().dropped.clone()
    }

    /// Returns the port passed to `initialize`, if it was called.
    #[must_use]
    pub fn initialized_on(&self) -> Option<u16> {
        self.inner.lock().initialized_on
    }

    /// Returns the base session ID the server configured.
    #[must_use]
    pub fn base_session_id(&self) -> Option<SessionId> {
        self.inner.lock().base
    }

    /// Returns true once `shutdown` was called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.lock().shut_down
    }

    /// Returns the number of events still queued.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.lock().events.len()
    }

    /// Returns how many times the engine was polled.
    #[must_use]
    pub fn polls(&self) -> u64 {
        self.inner.lock().polls
    }
}

/// Engine replaying events queued through a [`ScriptHandle`].
#[derive(Debug)]
pub struct ScriptedEngine {
    script: ScriptHandle,
}

impl ScriptedEngine {
    /// Creates an engine and the handle that drives it.
    #[must_use]
    pub fn new() -> (Self, ScriptHandle) {
        let script = ScriptHandle::default();
        (
            Self {
                script: script.clone(),
            },
            script,
        )
    }
}

impl EngineBinding for ScriptedEngine {
    fn initialize(&mut self, port: u16) -> Result<(), EngineError> {
        let mut script = self.script.inner.lock();
        if let Some(message) = script.init_failure.clone() {
            return Err(EngineError::rejected(message));
        }
        if script.initialized_on.is_some() {
            return Err(EngineError::AlreadyInitialized);
        }
        script.initialized_on = Some(port);
        Ok(())
    }

    fn set_base_session_id(&mut self, base: SessionId) {
        self.script.inner.lock().base = Some(base);
    }

    fn poll(&mut self) -> Result<RawEvent, EngineError> {
        let mut script = self.script.inner.lock();
        if script.initialized_on.is_none() || script.shut_down {
            return Err(EngineError::NotInitialized);
        }
        script.polls += 1;
        match script.events.pop_front() {
            Some(Ok(event)) => Ok(event),
            Some(Err(message)) => Err(EngineError::malformed(message)),
            None => Ok(RawEvent::None),
        }
    }

    fn send(
        &mut self,
        session_id: SessionId,
        channel: u8,
        payloads: &[Bytes],
    ) -> Result<(), EngineError> {
        let mut script = self.script.inner.lock();
        if script.initialized_on.is_none() || script.shut_down {
            return Err(EngineError::NotInitialized);
        }
        if script.failing.contains(&session_id) {
            return Err(EngineError::rejected(format!(
                "scripted send failure for session {session_id}"
            )));
        }
        script.sent.push(SentPacket {
            session_id,
            channel,
            payloads: payloads.to_vec(),
        });
        Ok(())
    }

    fn disconnect(&mut self, session_id: SessionId) {
        self.script.inner.lock().dropped.push(session_id);
    }

    fn shutdown(&mut self) {
        self.script.inner.lock().shut_down = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replays_in_order() {
        let (mut engine, script) = ScriptedEngine::new();
        engine.initialize(17091).unwrap();
        assert_eq!(script.initialized_on(), Some(17091));

        script.connect(1);
        script.receive(1, 0, Bytes::from_static(b"hi"));
        script.push_error("garbled");
        script.disconnect(1);

        assert_eq!(
            engine.poll().unwrap(),
            RawEvent::Connect {
                session_id: 1,
                peer: None
            }
        );
        assert!(matches!(
            engine.poll().unwrap(),
            RawEvent::Receive { session_id: 1, .. }
        ));
        assert!(matches!(engine.poll(), Err(EngineError::Malformed { .. })));
        assert_eq!(
            engine.poll().unwrap(),
            RawEvent::Disconnect { session_id: 1 }
        );
        assert_eq!(engine.poll().unwrap(), RawEvent::None);
        assert_eq!(script.polls(), 5);
    }

    #[test]
    fn test_send_records_and_fails() {
        let (mut engine, script) = ScriptedEngine::new();
        engine.initialize(1).unwrap();
        script.fail_sends_to(2);

        engine.send(1, 3, &[Bytes::from_static(b"a")]).unwrap();
        assert!(engine.send(2, 3, &[Bytes::from_static(b"b")]).is_err());

        let sent = script.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].session_id, 1);
        assert_eq!(sent[0].channel, 3);
        assert!(script.sent_to(2).is_empty());
    }

    #[test]
    fn test_initialize_failure() {
        let (mut engine, script) = ScriptedEngine::new();
        script.fail_initialize("port 17091 in use");
        let err = engine.initialize(17091).unwrap_err();
        assert_eq!(err.to_string(), "rejected: port 17091 in use");
        assert!(matches!(engine.poll(), Err(EngineError::NotInitialized)));
    }

    #[test]
    fn test_shutdown_stops_polling() {
        let (mut engine, script) = ScriptedEngine::new();
        engine.initialize(1).unwrap();
        script.connect(1);
        engine.shutdown();

        assert!(script.is_shut_down());
        assert!(matches!(engine.poll(), Err(EngineError::NotInitialized)));
        assert_eq!(script.pending(), 1);
    }
}
