//! Session registry.

use crate::error::RegistryError;
use peerlink_core::SessionId;
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// Session information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Session ID.
    pub id: SessionId,
    /// Peer address, if the engine exposes it.
    pub peer_addr: Option<SocketAddr>,
    /// Creation timestamp (nanos since epoch).
    pub created_at: u64,
    /// Last activity timestamp.
    pub last_activity: u64,
    /// Payloads received.
    pub packets_received: u64,
    /// Payload bytes received.
    pub bytes_received: u64,
}

/// Tracks live sessions.
///
/// The poll loop is the only writer. Numbering belongs to the engine; the
/// registry records the IDs it reports and refuses IDs that would break
/// uniqueness or exceed the configured capacity.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: BTreeMap<SessionId, Session>,
    base: SessionId,
    capacity: usize,
}

impl SessionRegistry {
    /// Creates a registry for IDs starting at `base`, holding at most
    /// `capacity` live sessions.
    #[must_use]
    pub fn new(base: SessionId, capacity: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            base,
            capacity,
        }
    }

    /// Records a new live session under the engine-provided ID.
    ///
    /// # Errors
    /// - [`RegistryError::BelowBase`] if `id` is below the configured base
    /// - [`RegistryError::AlreadyLive`] if `id` is already live
    /// - [`RegistryError::Exhausted`] if the registry is full
    pub fn assign(
        &mut self,
        id: SessionId,
        peer_addr: Option<SocketAddr>,
    ) -> Result<SessionId, RegistryError> {
        if id < self.base {
            return Err(RegistryError::BelowBase {
                id,
                base: self.base,
            });
        }
        if self.sessions.contains_key(&id) {
            return Err(RegistryError::AlreadyLive(id));
        }
        if self.sessions.len() >= self.capacity {
            return Err(RegistryError::Exhausted {
                capacity: self.capacity,
            });
        }

        let now = now_nanos();
        self.sessions.insert(
            id,
            Session {
                id,
                peer_addr,
                created_at: now,
                last_activity: now,
                packets_received: 0,
                bytes_received: 0,
            },
        );
        Ok(id)
    }

    /// Frees a session ID. Returns `None` if it was not live.
    pub fn release(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    /// Returns true if `id` belongs to a live session.
    #[must_use]
    pub fn is_live(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Gets a session by ID.
    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions.get(&id).cloned()
    }

    /// Records a received payload. Returns false if `id` is not live.
    pub fn touch(&mut self, id: SessionId, bytes: usize) -> bool {
        let Some(session) = self.sessions.get_mut(&id) else {
            return false;
        };
        session.last_activity = now_nanos();
        session.packets_received += 1;
        session.bytes_received += bytes as u64;
        true
    }

    /// Returns the number of live sessions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Returns the configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns all live session IDs in ascending order.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    /// Drops every session. Returns how many were live.
    pub fn clear(&mut self) -> usize {
        let count = self.sessions.len();
        self.sessions.clear();
        count
    }
}

fn now_nanos() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
