// Copyright (c) 2025-2026 Zensical and contributors

// SPDX-License-Identifier: MIT
// All contributions are certified under the DCO

// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to
// deal in the Software without restriction, including without limitation the
// rights to use, copy, modify, merge, publish, distribute, sublicense, and/or
// sell copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:

// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NON-INFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS
// IN THE SOFTWARE.

// ----------------------------------------------------------------------------

//! Acceptor bridge.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::id::SchedulerId;
use super::session::init::InitQueue;

/// Sentinel value of a listener's owner slot meaning "unclaimed".
const UNCLAIMED: usize = usize::MAX;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Fleet-level handoff slot for a single listen socket.
///
/// Every scheduler eligible to accept on a listener shares one
/// `ListenerSlot`. Readiness fires on every eligible scheduler's poller, but
/// only the scheduler that wins the compare-and-set on `owner` actually
/// performs the accept; it resets the slot to [`UNCLAIMED`] once done so the
/// next readiness event can be claimed by whichever scheduler observes it
/// first.
///
/// Grounded in the per-listener owner-slot handoff `spec.md` §4.2 and §5
/// describe: a single CAS, no central queue, winner determined by contention
/// on the accept itself.
#[derive(Debug)]
pub struct ListenerSlot {
    owner: AtomicUsize,
}

impl ListenerSlot {
    /// Creates an unclaimed slot.
    #[must_use]
    pub fn new() -> Self {
        Self { owner: AtomicUsize::new(UNCLAIMED) }
    }

    /// Attempts to claim this listener for `scheduler_id`.
    ///
    /// Returns `true` if the claim succeeded; the caller must call
    /// [`ListenerSlot::release`] after the accept completes, win or lose.
    pub fn try_claim(&self, scheduler_id: SchedulerId) -> bool {
        self.owner
            .compare_exchange(UNCLAIMED, scheduler_id, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Relinquishes the slot, making it claimable again.
    pub fn release(&self) {
        self.owner.store(UNCLAIMED, Ordering::Release);
    }
}

impl Default for ListenerSlot {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Traits
// ----------------------------------------------------------------------------

/// Collaborator that performs the non-blocking accept itself.
///
/// The scheduler owns only the handoff; the mechanics of turning a ready
/// listener into an accepted socket and a [`SessionInitTask`][] belong to
/// this trait, consistent with `spec.md` §6 naming `AcceptorManager` as an
/// external collaborator.
///
/// [`SessionInitTask`]: crate::scheduler::session::init::SessionInitTask
pub trait AcceptorManager: fmt::Debug {
    /// Registers a listener with the fleet, scoped to the given scheduler.
    fn register_accepter(&mut self, scheduler_id: SchedulerId);

    /// Runs any deferred accepter-registration tasks queued for this
    /// scheduler. Called once per admission pass.
    fn run_register_accepter_tasks(&mut self, scheduler_id: SchedulerId);

    /// Accepts a ready connection for the given listener, producing a
    /// [`SessionInitTask`][] enqueued locally by the caller.
    ///
    /// Returns `None` if the listener had no pending connection by the time
    /// this scheduler won the handoff (a benign race with another thread
    /// that drained it first).
    ///
    /// [`SessionInitTask`]: crate::scheduler::session::init::SessionInitTask
    fn accept(
        &mut self, listener: &Arc<ListenerSlot>, scheduler_id: SchedulerId,
    ) -> Option<Box<dyn crate::scheduler::session::SessionInitTask>>;
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

/// Bridges fleet-level listener readiness into this scheduler's local
/// [`InitQueue`].
///
/// Owns the set of listeners this scheduler is eligible to accept on and the
/// collaborator that performs the actual accept syscall.
pub struct AcceptorBridge {
    scheduler_id: SchedulerId,
    listeners: Vec<Arc<ListenerSlot>>,
    manager: Box<dyn AcceptorManager>,
}

impl fmt::Debug for AcceptorBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceptorBridge")
            .field("scheduler_id", &self.scheduler_id)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl AcceptorBridge {
    /// Creates a bridge for the given scheduler with no registered
    /// listeners yet.
    pub fn new(scheduler_id: SchedulerId, manager: Box<dyn AcceptorManager>) -> Self {
        Self { scheduler_id, listeners: Vec::new(), manager }
    }

    /// Registers a listen socket as eligible for this scheduler to accept
    /// on.
    pub fn register(&mut self, listener: Arc<ListenerSlot>) {
        self.manager.register_accepter(self.scheduler_id);
        self.listeners.push(listener);
    }

    /// Runs deferred accepter-registration tasks, then attempts the handoff
    /// on every registered listener, pushing any produced
    /// [`SessionInitTask`][] into `init_queue`.
    ///
    /// A listener whose CAS fails this pass is simply skipped; another
    /// scheduler already owns the accept for this readiness event.
    ///
    /// [`SessionInitTask`]: crate::scheduler::session::init::SessionInitTask
    pub fn admit_pending(&mut self, init_queue: &mut InitQueue) {
        self.manager.run_register_accepter_tasks(self.scheduler_id);
        for listener in &self.listeners {
            if !listener.try_claim(self.scheduler_id) {
                continue;
            }
            let task = self.manager.accept(listener, self.scheduler_id);
            listener.release();
            if let Some(task) = task {
                init_queue.push(task);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_excludes_concurrent_claim() {
        let slot = ListenerSlot::new();
        assert!(slot.try_claim(1));
        assert!(!slot.try_claim(2));
        slot.release();
        assert!(slot.try_claim(2));
    }

    #[test]
    fn release_makes_slot_claimable_again() {
        let slot = ListenerSlot::new();
        assert!(slot.try_claim(7));
        slot.release();
        assert!(slot.try_claim(9));
    }

    #[derive(Debug, Default)]
    struct CountingManager {
        registered: usize,
        ran_tasks: usize,
        accepts: usize,
    }

    impl AcceptorManager for CountingManager {
        fn register_accepter(&mut self, _scheduler_id: SchedulerId) {
            self.registered += 1;
        }
        fn run_register_accepter_tasks(&mut self, _scheduler_id: SchedulerId) {
            self.ran_tasks += 1;
        }
        fn accept(
            &mut self, _listener: &Arc<ListenerSlot>, _scheduler_id: SchedulerId,
        ) -> Option<Box<dyn crate::scheduler::session::SessionInitTask>> {
            self.accepts += 1;
            None
        }
    }

    #[test]
    fn admit_pending_releases_slot_after_accept() {
        let mut bridge = AcceptorBridge::new(0, Box::new(CountingManager::default()));
        let slot = Arc::new(ListenerSlot::new());
        bridge.register(Arc::clone(&slot));
        let mut init_queue = InitQueue::new();
        bridge.admit_pending(&mut init_queue);
        assert!(slot.try_claim(99));
    }
}
