//! Raw engine events and the normalized events applications subscribe to.

use crate::id::SessionId;
use bytes::Bytes;
use std::fmt;
use std::net::SocketAddr;

/// One result of an engine poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// A peer finished connecting and was numbered by the engine.
    Connect {
        /// Session ID assigned by the engine.
        session_id: SessionId,
        /// Transport address of the peer, if the engine exposes it.
        peer: Option<SocketAddr>,
    },
    /// A payload arrived from a peer.
    Receive {
        /// Session that sent the payload.
        session_id: SessionId,
        /// Engine channel the payload arrived on.
        channel: u8,
        /// Payload bytes.
        payload: Bytes,
    },
    /// A peer went away.
    Disconnect {
        /// Session that disconnected.
        session_id: SessionId,
    },
    /// Nothing happened during this poll.
    None,
}

impl RawEvent {
    /// Returns the session the event refers to, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Self::Connect { session_id, .. }
            | Self::Receive { session_id, .. }
            | Self::Disconnect { session_id } => Some(*session_id),
            Self::None => None,
        }
    }

    /// Returns true for [`RawEvent::None`].
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Kinds of normalized events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A session was established.
    Connect,
    /// A session sent a payload.
    Data,
    /// A session ended.
    Disconnect,
}

impl EventKind {
    /// All kinds, in lifecycle order.
    pub const ALL: [EventKind; 3] = [Self::Connect, Self::Data, Self::Disconnect];

    /// Returns the lowercase event name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Data => "data",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event delivered to application handlers.
///
/// Handlers get the event by reference for the duration of one call. A
/// handler that needs the payload afterwards clones the [`Bytes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `connect(session_id)`
    Connect(SessionId),
    /// `data(session_id, payload)`
    Data {
        /// Session that sent the payload.
        session_id: SessionId,
        /// Engine channel the payload arrived on.
        channel: u8,
        /// Payload bytes.
        payload: Bytes,
    },
    /// `disconnect(session_id)`
    Disconnect(SessionId),
}

impl Event {
    /// Returns the kind of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connect(_) => EventKind::Connect,
            Self::Data { .. } => EventKind::Data,
            Self::Disconnect(_) => EventKind::Disconnect,
        }
    }

    /// Returns the session this event belongs to.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Connect(id) | Self::Disconnect(id) => *id,
            Self::Data { session_id, .. } => *session_id,
        }
    }

    /// Returns the payload of a data event.
    #[must_use]
    pub fn payload(&self) -> Option<&Bytes> {
        match self {
            Self::Data { payload, .. } => Some(payload),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_event_session_id() {
        let connect = RawEvent::Connect {
            session_id: 4,
            peer: None,
        };
        assert_eq!(connect.session_id(), Some(4));
        assert!(!connect.is_none());

        assert_eq!(RawEvent::None.session_id(), None);
        assert!(RawEvent::None.is_none());
    }

    #[test]
    fn test_event_accessors() {
        let event = Event::Data {
            session_id: 9,
            channel: 1,
            payload: Bytes::from_static(b"ping"),
        };
        assert_eq!(event.kind(), EventKind::Data);
        assert_eq!(event.session_id(), 9);
        assert_eq!(event.payload().map(|p| p.as_ref()), Some(&b"ping"[..]));

        let event = Event::Disconnect(9);
        assert_eq!(event.kind(), EventKind::Disconnect);
        assert!(event.payload().is_none());
    }

    #[test]
    fn test_event_kind_display() {
        let names: Vec<String> = EventKind::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(names, ["connect", "data", "disconnect"]);
    }
}
