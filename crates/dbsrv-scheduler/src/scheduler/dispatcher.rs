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

//! Priority-based command selection.
//!
//! `spec.md` §4.5 describes `executeNextStatement` as a single loop threading
//! through housekeeping, selection, and one-step execution. That loop is
//! owned by [`crate::scheduler::tick`], which has the full set of
//! collaborators it needs to interleave; this module owns only the selection
//! half — `nextBestCommand`'s cache and the scan that fills it — since that
//! is the part with a real invariant to protect ("belongs to a session
//! currently in the registry", `spec.md` §8).

use std::time::Instant;

use super::id::{Priority, SessionId, MIN_PRIORITY};
use super::session::Sessions;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Holds the single-slot `nextBestCommand` cache and performs the priority
/// scan that fills it.
#[derive(Debug, Default)]
pub struct Dispatcher {
    /// Session owning the cached best command, if selection has already run
    /// this iteration and found one.
    next_best_command: Option<SessionId>,
    /// Session that ran the previous step, used to detect repeated
    /// selection of the same command for anti-starvation interleaving
    /// (`spec.md` §4.5 step 6).
    previous: Option<SessionId>,
}

impl Dispatcher {
    /// Creates a dispatcher with no cached candidate.
    #[must_use]
    pub fn new() -> Self {
        Self { next_best_command: None, previous: None }
    }

    /// Returns the cached candidate, if selection already ran this
    /// iteration and found a winner.
    #[must_use]
    pub fn cached(&self) -> Option<SessionId> {
        self.next_best_command
    }

    /// Clears the cache, forcing the next call to
    /// [`Dispatcher::get_next_best_command`] to rescan.
    pub fn clear_cache(&mut self) {
        self.next_best_command = None;
    }

    /// Stores a pre-found candidate directly, bypassing a scan.
    ///
    /// Used by [`yield_if_needed`][] when it finds a higher-priority peer on
    /// the caller's behalf.
    ///
    /// [`yield_if_needed`]: crate::scheduler::yield_protocol::yield_if_needed
    pub fn set_cached(&mut self, session_id: SessionId) {
        self.next_best_command = Some(session_id);
    }

    /// Scans the session registry once, asking each non-closed,
    /// non-excluded session for its current command, and returns the
    /// session owning the one with strictly greatest priority above
    /// `min_priority`.
    ///
    /// Ties resolve to whichever session is seen first in registry order,
    /// since only a strictly greater priority displaces the running
    /// maximum. `check_timeout` is forwarded to each session so a timed-out
    /// command can self-abort during the scan (`spec.md` §4.5, §8 scenario
    /// 6).
    pub fn get_next_best_command(
        &self, sessions: &mut Sessions, exclude: Option<SessionId>, min_priority: Priority,
        check_timeout: bool, now: Instant,
    ) -> Option<SessionId> {
        let mut best: Option<(SessionId, Priority)> = None;
        sessions.for_each(|id, session| {
            if Some(id) == exclude || session.is_mark_closed() {
                return;
            }
            let Some(command) = session.yieldable_command(check_timeout, now) else {
                return;
            };
            let priority = command.priority();
            if priority <= min_priority {
                return;
            }
            if best.is_none_or(|(_, best_priority)| priority > best_priority) {
                best = Some((id, priority));
            }
        });
        best.map(|(id, _)| id)
    }

    /// Fills the cache from a scan if it is currently empty.
    ///
    /// Equivalent to `spec.md` §4.5 step 3: take the cached candidate if
    /// set, else scan with `minPriority = MIN_PRIORITY - 1` so even a
    /// command sitting exactly at the floor is eligible.
    pub fn fill_cache(&mut self, sessions: &mut Sessions, now: Instant) -> Option<SessionId> {
        if self.next_best_command.is_none() {
            self.next_best_command =
                self.get_next_best_command(sessions, None, MIN_PRIORITY - 1, true, now);
        }
        self.next_best_command
    }

    /// Records which session ran the previous step, for anti-starvation
    /// detection of repeated selection.
    pub fn record_ran(&mut self, session_id: SessionId) {
        self.previous = Some(session_id);
    }

    /// Returns whether `session_id` is the same session that ran on the
    /// previous step — signals that housekeeping should be interleaved to
    /// avoid starving it under a steady stream of commands from one
    /// session.
    #[must_use]
    pub fn ran_previously(&self, session_id: SessionId) -> bool {
        self.previous == Some(session_id)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
