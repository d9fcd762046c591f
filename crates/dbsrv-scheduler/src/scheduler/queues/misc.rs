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

//! Misc one-shot task queue.

use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use mio::Waker;
use tracing::warn;

/// A one-shot unit of work submittable from any thread.
///
/// Returns `Err` rather than panicking on failure, so `drain_and_run` can
/// isolate one task's failure from its neighbors the way `spec.md` §7
/// requires for task failures: logged at warn, dropped, never propagated.
pub type MiscTask = Box<dyn FnOnce() -> Result<(), Box<dyn Error + Send + Sync>> + Send>;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// FIFO queue of misc one-shot tasks.
///
/// Submission happens from any thread via [`MiscQueue::handle`], which
/// pushes onto a bounded `crossbeam` channel and then wakes the owning
/// scheduler's event loop, so a task submitted while the loop is blocked in
/// `poll` is observed promptly rather than waiting out the idle poll
/// deadline. The owning scheduler drains the channel into a local
/// [`VecDeque`] before running anything, so a misc task is only ever
/// touched by its owning thread from the moment it is popped. This mirrors
/// the teacher's cross-thread submission pattern of handing work to the
/// owner through a channel rather than sharing a lock.
pub struct MiscQueue {
    sender: Sender<MiscTask>,
    receiver: Receiver<MiscTask>,
    local: VecDeque<MiscTask>,
    waker: Arc<Waker>,
}

impl fmt::Debug for MiscQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiscQueue").field("queued_locally", &self.local.len()).finish_non_exhaustive()
    }
}

impl MiscQueue {
    /// Creates a queue with the given cross-thread channel capacity, waking
    /// `waker` whenever a task is handed in across threads.
    #[must_use]
    pub fn with_capacity(capacity: usize, waker: Arc<Waker>) -> Self {
        let (sender, receiver) = channel::bounded(capacity);
        Self { sender, receiver, local: VecDeque::new(), waker }
    }

    /// Submits a task for the owning scheduler to run, from any thread, and
    /// wakes the event loop so a blocked `poll` notices it without waiting
    /// out the idle deadline.
    ///
    /// Returns `false` if the channel is full; the caller should treat this
    /// as a signal to back off, not retry synchronously.
    pub fn handle(&self, task: MiscTask) -> bool {
        match self.sender.try_send(task) {
            Ok(()) => {
                let _ = self.waker.wake();
                true
            }
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
        }
    }

    /// Returns a cloneable handle that can submit tasks without holding a
    /// reference to the owning scheduler.
    #[must_use]
    pub fn handle_ref(&self) -> MiscHandle {
        MiscHandle { sender: self.sender.clone(), waker: Arc::clone(&self.waker) }
    }

    /// Drains every task currently sitting in the cross-thread channel into
    /// the local queue, without running any of them.
    fn absorb_pending(&mut self) {
        while let Ok(task) = self.receiver.try_recv() {
            self.local.push_back(task);
        }
    }

    /// Runs every queued task to completion, draining the queue to empty.
    ///
    /// Pop-before-run: a panicking task is already removed from the queue
    /// by the time it runs, so it is never re-executed. Once this returns,
    /// the queue is empty — equivalent to the source's size/tail reset on
    /// drain-to-empty.
    pub fn drain_and_run(&mut self) {
        self.absorb_pending();
        while let Some(task) = self.local.pop_front() {
            if let Err(err) = task() {
                warn!(error = %err, "misc task failed");
            }
        }
    }

    /// Returns the number of tasks currently queued locally (not counting
    /// ones still sitting in the cross-thread channel).
    #[must_use]
    pub fn len(&self) -> usize {
        self.local.len()
    }

    /// Returns whether the local queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }
}

/// Cloneable, `Send + Sync` submission handle for a [`MiscQueue`].
///
/// Holds only the channel sender and the event loop's waker — neither of
/// which borrows the scheduler — so it can be shared with and called from
/// any thread even though the [`Scheduler`][] itself is not `Sync`.
///
/// [`Scheduler`]: crate::scheduler::Scheduler
#[derive(Clone)]
pub struct MiscHandle {
    sender: Sender<MiscTask>,
    waker: Arc<Waker>,
}

impl fmt::Debug for MiscHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiscHandle").finish_non_exhaustive()
    }
}

impl MiscHandle {
    /// Submits a task for the owning scheduler to run, waking its event
    /// loop so a blocked `poll` observes it promptly.
    ///
    /// Returns `false` if the channel is full or the owning scheduler has
    /// been dropped.
    pub fn handle(&self, task: MiscTask) -> bool {
        match self.sender.try_send(task) {
            Ok(()) => {
                let _ = self.waker.wake();
                true
            }
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
