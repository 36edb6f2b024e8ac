//! Outbound packet description.

use crate::error::{Error, Result};
use crate::id::SessionId;
use bytes::Bytes;

/// Where a packet goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// One session.
    Session(SessionId),
    /// Every live session, optionally skipping one.
    Broadcast {
        /// Session to skip.
        exclude: Option<SessionId>,
    },
}

impl Target {
    /// Returns true if a packet with this target should reach `session_id`.
    #[must_use]
    pub fn includes(&self, session_id: SessionId) -> bool {
        match *self {
            Self::Session(id) => id == session_id,
            Self::Broadcast { exclude } => exclude != Some(session_id),
        }
    }
}

/// Packets headed for the engine in one call.
///
/// Built per send and handed to the engine; never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    target: Target,
    channel: u8,
    payloads: Vec<Bytes>,
}

impl Packet {
    /// Creates a packet carrying one payload.
    #[must_use]
    pub fn new(target: Target, channel: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            target,
            channel,
            payloads: vec![payload.into()],
        }
    }

    /// Creates a packet carrying several payloads.
    ///
    /// # Errors
    /// Returns [`Error::EmptyPacket`] if `payloads` is empty.
    pub fn with_payloads(target: Target, channel: u8, payloads: Vec<Bytes>) -> Result<Self> {
        if payloads.is_empty() {
            return Err(Error::EmptyPacket);
        }
        Ok(Self {
            target,
            channel,
            payloads,
        })
    }

    /// Returns the target.
    #[must_use]
    pub fn target(&self) -> Target {
        self.target
    }

    /// Returns the channel.
    #[must_use]
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Returns the payloads.
    #[must_use]
    pub fn payloads(&self) -> &[Bytes] {
        &self.payloads
    }

    /// Returns the number of payloads handed to the engine.
    #[must_use]
    pub fn count(&self) -> usize {
        self.payloads.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_includes() {
        assert!(Target::Session(3).includes(3));
        assert!(!Target::Session(3).includes(4));

        let all = Target::Broadcast { exclude: None };
        assert!(all.includes(0));

        let but_two = Target::Broadcast { exclude: Some(2) };
        assert!(but_two.includes(1));
        assert!(!but_two.includes(2));
    }

    #[test]
    fn test_packet_with_payloads() {
        let packet = Packet::with_payloads(
            Target::Session(1),
            2,
            vec![Bytes::from_static(b"a"), Bytes::from_static(b"bc")],
        )
        .unwrap();
        assert_eq!(packet.count(), 2);
        assert_eq!(packet.channel(), 2);
        assert_eq!(packet.target(), Target::Session(1));
    }

    #[test]
    fn test_packet_empty_rejected() {
        let result = Packet::with_payloads(Target::Session(1), 0, Vec::new());
        assert!(matches!(result, Err(Error::EmptyPacket)));
    }
}
