//! External collaborator contracts (C10): the broadcast sink a store posts
//! committed patches to, and the observer signal a host uses to collect
//! change events. Both are traits so the transport/delivery mechanism stays
//! entirely outside the core, per §1's scope cut.

use crate::change::ChangeEvent;
use crate::patch::Transaction;

/// Receives exactly one `post` call per committed local transaction that
/// produced a non-empty patch. Assumed synchronous-fast (§5): a sink that
/// might block should buffer internally rather than stalling the store.
pub trait BroadcastSink {
    fn post(&mut self, transaction: &Transaction);
}

/// A sink that posts nowhere; useful for stores with no peers yet attached.
#[derive(Default)]
pub struct NullSink;

impl BroadcastSink for NullSink {
    fn post(&mut self, _transaction: &Transaction) {}
}

/// Delivers observer events. The store calls this once per committed
/// transaction (local, remote, undo, or redo) that produced a non-empty
/// change set; delivery is asynchronous relative to the mutation call site
/// (§5) - implementations may queue `event` for a later turn rather than
/// acting on it inline, so long as callbacks never observe in-transaction
/// state and commit order is preserved.
pub trait Observer {
    fn notify(&mut self, event: ChangeEvent);
}

/// An observer that drops every event; useful when a host only cares about
/// the broadcast sink.
#[derive(Default)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn notify(&mut self, _event: ChangeEvent) {}
}

/// Queues events for later, asynchronous delivery. This is the store's
/// default observer relay: `begin`/mutate/`end` never call a host callback
/// inline, they push here, and the host drains the queue (`drain`) on its
/// own schedule (a task queue, a deferred callback, or a same-turn message
/// pump per §9's design note).
#[derive(Default)]
pub struct QueuedObserver {
    queue: std::collections::VecDeque<ChangeEvent>,
}

impl QueuedObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns all queued events, oldest first (commit order).
    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        self.queue.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

impl Observer for QueuedObserver {
    fn notify(&mut self, event: ChangeEvent) {
        self.queue.push_back(event);
    }
}
