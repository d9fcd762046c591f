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

//! Periodic task registry.

use std::error::Error;
use std::fmt;
use std::time::Instant;

use slab::Slab;
use tracing::warn;

/// Identifier returned by [`PeriodicTasks::add`], used to remove a task
/// later via [`PeriodicTasks::remove`].
pub type PeriodicTaskId = usize;

// ----------------------------------------------------------------------------
// Traits
// ----------------------------------------------------------------------------

/// A function with a scheduler-local due time, run on a full scan each
/// housekeeping pass.
///
/// Registered only from the main thread before the scheduler starts, or
/// from the owning scheduler thread afterward (`spec.md` §3) — never from a
/// foreign thread, which is why this registry needs no locking.
pub trait PeriodicTask: fmt::Debug {
    /// Returns whether the task is due at `now`. Implementations own their
    /// due-time and period bookkeeping; the registry only asks.
    fn is_due(&self, now: Instant) -> bool;

    /// Runs the task, which is responsible for rescheduling its own next
    /// due time.
    ///
    /// # Errors
    ///
    /// Returns an error if the task body fails; the registry logs it and
    /// keeps the task registered for the next pass (no eviction on
    /// failure).
    fn run(&mut self, now: Instant) -> Result<(), Box<dyn Error + Send + Sync>>;
}

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Registry of periodic tasks, full-scanned once per housekeeping pass.
///
/// Per the open question in `spec.md` §9, tasks are polled once at loop top
/// and bypassed entirely once the scheduler's `stopped` flag is set — a
/// throwing task at shutdown therefore never runs.
#[derive(Debug, Default)]
pub struct PeriodicTasks {
    tasks: Slab<Box<dyn PeriodicTask>>,
}

impl PeriodicTasks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { tasks: Slab::new() }
    }

    /// Registers a task, returning an id usable with
    /// [`PeriodicTasks::remove`]. Owner-thread only once the scheduler is
    /// running.
    pub fn add(&mut self, task: Box<dyn PeriodicTask>) -> PeriodicTaskId {
        self.tasks.insert(task)
    }

    /// Unregisters a previously added task. Owner-thread only.
    pub fn remove(&mut self, id: PeriodicTaskId) -> Option<Box<dyn PeriodicTask>> {
        self.tasks.try_remove(id)
    }

    /// Returns the number of registered tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns whether no tasks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Scans every registered task once, running the ones that report
    /// themselves due.
    ///
    /// A task whose `run` fails is logged at warn and left registered; it
    /// gets another chance next pass. Failure never removes a task, and a
    /// failing task never prevents its neighbors from running this pass.
    pub fn run_due(&mut self, now: Instant) {
        for (_, task) in &mut self.tasks {
            if !task.is_due(now) {
                continue;
            }
            if let Err(err) = task.run(now) {
                warn!(error = %err, "periodic task failed");
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
