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

//! Memory-pressure GC coordination.

use std::fmt;

use super::id::SchedulerId;
use super::session::Sessions;

// ----------------------------------------------------------------------------
// Traits
// ----------------------------------------------------------------------------

/// Process-wide transaction engine, shared and internally synchronized.
///
/// Expressed as an explicit collaborator handle rather than the source's
/// `getDefaultTransactionEngine()` singleton (`spec.md` §9): the scheduler
/// treats it as opaque and never assumes anything about its internals
/// beyond the two operations below being safe to call from any scheduler
/// thread.
pub trait TransactionEngine: fmt::Debug {
    /// Runs a full GC pass, partitioned across the fleet by scheduler
    /// index. Safe to call concurrently from all schedulers for distinct
    /// `this_id` values.
    fn full_gc(&self, total_schedulers: usize, this_id: SchedulerId);

    /// Advances pending transactions owned by this scheduler.
    fn run_pending_transactions(&self);
}

/// Process-wide memory-pressure predicate.
///
/// Read-only from the scheduler's perspective (`spec.md` §5).
pub trait MemoryManager: fmt::Debug {
    /// Returns whether memory pressure currently warrants a full GC pass.
    fn need_full_gc(&self) -> bool;
}

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Triggers per-session cache flush and cross-scheduler transaction GC when
/// memory pressure crosses a threshold.
pub struct GcCoordinator {
    scheduler_id: SchedulerId,
    total_schedulers: usize,
    memory: Box<dyn MemoryManager>,
    transactions: Box<dyn TransactionEngine>,
}

impl fmt::Debug for GcCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcCoordinator")
            .field("scheduler_id", &self.scheduler_id)
            .field("total_schedulers", &self.total_schedulers)
            .finish_non_exhaustive()
    }
}

impl GcCoordinator {
    /// Creates a coordinator for the given scheduler index within a fleet of
    /// `total_schedulers`.
    pub fn new(
        scheduler_id: SchedulerId, total_schedulers: usize, memory: Box<dyn MemoryManager>,
        transactions: Box<dyn TransactionEngine>,
    ) -> Self {
        Self { scheduler_id, total_schedulers, memory, transactions }
    }

    /// Consults the memory manager and, if it reports pressure, clears every
    /// session's query cache on this scheduler and runs a partitioned full
    /// GC pass on the shared transaction engine.
    ///
    /// Per the open question in `spec.md` §9, this is only ever invoked
    /// between dispatcher iterations — never mid-step — so `clearQueryCache`
    /// can assume it never races a session's in-flight command.
    pub fn check(&self, sessions: &mut Sessions) {
        if !self.memory.need_full_gc() {
            return;
        }
        sessions.for_each(|_, session| session.clear_query_cache());
        self.transactions.full_gc(self.total_schedulers, self.scheduler_id);
    }

    /// Advances pending transactions owned by this scheduler. Invoked once
    /// per main-loop iteration, independent of memory pressure.
    pub fn run_pending_transactions(&self) {
        self.transactions.run_pending_transactions();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
