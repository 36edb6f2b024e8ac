//! Event dispatcher routing normalized events to registered handlers.

use crate::handler::{HandlerId, HandlerResult};
use parking_lot::RwLock;
use peerlink_core::{Event, EventKind};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Handler closure invoked with a context and the event.
pub type Handler<C> = dyn Fn(&C, &Event) -> HandlerResult + Send + Sync;

type Registered<C> = (HandlerId, Arc<Handler<C>>);

/// Result of one dispatch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Handlers invoked.
    pub invoked: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

/// Dispatcher that routes events to the handlers registered for their kind.
///
/// Handlers run in registration order. Each invocation is isolated: an
/// error or a panic is logged and the remaining handlers still run. The
/// handler list is snapshotted before invoking, so handlers may register or
/// remove handlers; the change applies from the next event.
pub struct Dispatcher<C> {
    handlers: RwLock<HashMap<EventKind, Vec<Registered<C>>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl<C> Dispatcher<C> {
    /// Creates a new empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Registers a handler for one event kind.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&C, &Event) -> HandlerResult + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Removes a handler. Returns false if it was not registered.
    pub fn off(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        for list in handlers.values_mut() {
            if let Some(pos) = list.iter().position(|(registered, _)| *registered == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Returns the number of handlers registered for `kind`.
    #[must_use]
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }

    /// Stops all further dispatch.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Returns true once [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Invokes every handler registered for the event's kind.
    pub fn dispatch(&self, ctx: &C, event: &Event) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        if self.is_closed() {
            return outcome;
        }

        let kind = event.kind();
        let snapshot: Vec<Registered<C>> =
            self.handlers.read().get(&kind).cloned().unwrap_or_default();

        for (id, handler) in snapshot {
            outcome.invoked += 1;
            match panic::catch_unwind(AssertUnwindSafe(|| handler(ctx, event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    outcome.failed += 1;
                    tracing::warn!(
                        "Handler {} failed on {} for session {}: {}",
                        id,
                        kind,
                        event.session_id(),
                        e
                    );
                }
                Err(payload) => {
                    outcome.failed += 1;
                    tracing::error!(
                        "Handler {} panicked on {} for session {}: {}",
                        id,
                        kind,
                        event.session_id(),
                        panic_message(payload.as_ref())
                    );
                }
            }
        }
        outcome
    }
}

impl<C> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
