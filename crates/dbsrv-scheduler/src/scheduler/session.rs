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

//! Session.

use std::fmt;
use std::time::{Duration, Instant};

use super::command::{CommandError, Command};
use super::id::{PacketId, SessionId};

pub mod collection;
pub mod init;
pub mod validator;

pub use collection::Sessions;
pub use init::SessionInitTask;
pub use validator::SessionValidator;

// ----------------------------------------------------------------------------
// Enums
// ----------------------------------------------------------------------------

/// Lifecycle state of a [`Session`].
///
/// A session moves `Open` -> `MarkClosed` -> removed from the registry. There
/// is no way back from `MarkClosed`: once marked, a session is skipped by
/// selection and reaped as soon as its queues have drained.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    /// Accepting work normally.
    Open,
    /// Tombstoned; skipped by selection, reaped once its queues drain.
    MarkClosed,
}

// ----------------------------------------------------------------------------
// Traits
// ----------------------------------------------------------------------------

/// A live client connection and its associated database session state.
///
/// This is the interface the scheduler consumes from the session collaborator
/// named in `spec.md` §6. Everything below it — SQL compilation, storage,
/// the wire protocol — is out of scope; the scheduler only needs enough to
/// order, time out, and tear down sessions fairly.
pub trait Session: fmt::Debug {
    /// Stable session identifier (the registry's slab key).
    fn session_id(&self) -> SessionId;

    /// Current lifecycle state.
    fn state(&self) -> SessionState;

    /// Tombstones the session. Idempotent.
    fn mark_closed(&mut self);

    /// Timestamp of the last observed activity.
    fn last_activity(&self) -> Instant;

    /// Idle budget before the session is considered timed out.
    fn timeout(&self) -> Duration;

    /// Returns whether the session is mark-closed.
    #[inline]
    fn is_mark_closed(&self) -> bool {
        self.state() == SessionState::MarkClosed
    }

    /// Marks the session closed if it has been idle past its `timeout`.
    ///
    /// Called once per session, each main-loop iteration, by
    /// [`Sessions::check_session_timeout`][]. Never unlinks the session from
    /// the registry — that happens lazily once its queues have drained, via
    /// [`Sessions::reap_closed`][].
    ///
    /// [`Sessions::check_session_timeout`]: collection::Sessions::check_session_timeout
    /// [`Sessions::reap_closed`]: collection::Sessions::reap_closed
    fn check_idle_timeout(&mut self, now: Instant) {
        if !self.is_mark_closed() && now.saturating_duration_since(self.last_activity()) > self.timeout() {
            self.mark_closed();
        }
    }

    /// Returns whether it is safe to remove this session from the registry.
    ///
    /// A mark-closed session with a non-empty per-session task queue must
    /// not be reaped yet, or queued work would be silently dropped.
    fn queues_drained(&self) -> bool {
        true
    }

    /// Drains and runs this session's per-session task queue.
    ///
    /// Invoked once per main-loop iteration by
    /// [`Sessions::run_session_tasks`][], and again opportunistically from
    /// the dispatcher's inner loop when no command was found.
    ///
    /// [`Sessions::run_session_tasks`]: collection::Sessions::run_session_tasks
    fn run_session_tasks(&mut self);

    /// Flushes cached query plans. Invoked by the GC coordinator between
    /// dispatcher iterations; never mid-step.
    fn clear_query_cache(&mut self);

    /// Surfaces an error on this session's outbound channel.
    ///
    /// The session itself decides whether the error is fatal to its state;
    /// the scheduler never closes a session on a command error unless the
    /// session chooses to mark itself closed in response.
    fn send_error(&mut self, packet_id: PacketId, err: &CommandError);

    /// Returns the session's current yieldable command, if any is ready.
    ///
    /// When `check_timeout` is set and the current command has exceeded its
    /// budget, implementations should surface a timeout error via
    /// [`Session::send_error`], mark the session closed, and return `None`
    /// instead of the command — this is the self-abort-during-selection
    /// behavior `spec.md` §4.5 requires.
    fn yieldable_command(
        &mut self, check_timeout: bool, now: Instant,
    ) -> Option<&mut dyn Command>;
}
