//! Session identifiers and the numbering policy engines apply to them.

use std::collections::BTreeSet;

/// Handle identifying one connected peer.
pub type SessionId = u32;

/// Hands out session IDs counting up from a base.
///
/// Reclaimed IDs are handed out again (lowest first) before the counter
/// advances, so an ID is only ever reused after it was released.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    base: SessionId,
    next: u64,
    reclaimed: BTreeSet<SessionId>,
}

impl IdAllocator {
    /// Creates an allocator starting at `base`.
    #[must_use]
    pub fn new(base: SessionId) -> Self {
        Self {
            base,
            next: u64::from(base),
            reclaimed: BTreeSet::new(),
        }
    }

    /// Returns the base the allocator counts up from.
    #[must_use]
    pub fn base(&self) -> SessionId {
        self.base
    }

    /// Allocates the next free ID, or `None` if the ID space is exhausted.
    pub fn allocate(&mut self) -> Option<SessionId> {
        if let Some(id) = self.reclaimed.pop_first() {
            return Some(id);
        }
        let id = SessionId::try_from(self.next).ok()?;
        self.next += 1;
        Some(id)
    }

    /// Returns an ID to the pool.
    ///
    /// Returns `false` if the ID was not allocated (never handed out, or
    /// already released).
    pub fn release(&mut self, id: SessionId) -> bool {
        if !self.is_allocated(id) {
            return false;
        }
        self.reclaimed.insert(id)
    }

    /// Returns true if `id` is currently handed out.
    #[must_use]
    pub fn is_allocated(&self, id: SessionId) -> bool {
        id >= self.base && u64::from(id) < self.next && !self.reclaimed.contains(&id)
    }

    /// Returns the number of IDs currently handed out.
    #[must_use]
    pub fn allocated(&self) -> usize {
        (self.next - u64::from(self.base)) as usize - self.reclaimed.len()
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(0)
    }
}
