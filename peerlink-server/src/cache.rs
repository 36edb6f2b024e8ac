//! Per-session application state.
//!
//! The server never reads or writes the cache itself; it hands it to
//! handlers. Entries are keyed by session ID and outlive the session unless
//! the application deletes them, so a reused ID sees the previous entry.

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use peerlink_core::SessionId;
use std::any::Any;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Value stored in a [`SessionCache`].
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// Key-value store keyed by session ID.
pub trait SessionCache: Send + Sync {
    /// Returns the value stored for `session_id`.
    fn get(&self, session_id: SessionId) -> Option<CacheValue>;

    /// Stores `value` for `session_id`, replacing any previous value.
    fn set(&self, session_id: SessionId, value: CacheValue);

    /// Removes and returns the value stored for `session_id`.
    fn delete(&self, session_id: SessionId) -> Option<CacheValue>;

    /// Returns the number of entries.
    fn len(&self) -> usize;

    /// Returns true if the cache holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry.
    fn clear(&self);
}

impl<'a> dyn SessionCache + 'a {
    /// Returns the value stored for `session_id` if it has type `T`.
    pub fn get_as<T: Any + Send + Sync>(&self, session_id: SessionId) -> Option<Arc<T>> {
        self.get(session_id)?.downcast::<T>().ok()
    }

    /// Stores `value` for `session_id`.
    pub fn insert<T: Any + Send + Sync>(&self, session_id: SessionId, value: T) {
        self.set(session_id, Arc::new(value));
    }
}

/// Unbounded in-memory cache. The default.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<SessionId, CacheValue>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionCache for MemoryCache {
    fn get(&self, session_id: SessionId) -> Option<CacheValue> {
        self.entries.read().get(&session_id).cloned()
    }

    fn set(&self, session_id: SessionId, value: CacheValue) {
        self.entries.write().insert(session_id, value);
    }

    fn delete(&self, session_id: SessionId) -> Option<CacheValue> {
        self.entries.write().remove(&session_id)
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}

/// Bounded cache evicting the least recently used entry.
pub struct LruSessionCache {
    entries: Mutex<LruCache<SessionId, CacheValue>>,
}

impl LruSessionCache {
    /// Creates a cache holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }
}

impl SessionCache for LruSessionCache {
    fn get(&self, session_id: SessionId) -> Option<CacheValue> {
        self.entries.lock().get(&session_id).cloned()
    }

    fn set(&self, session_id: SessionId, value: CacheValue) {
        self.entries.lock().put(session_id, value);
    }

    fn delete(&self, session_id: SessionId) -> Option<CacheValue> {
        self.entries.lock().pop(&session_id)
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }
}
