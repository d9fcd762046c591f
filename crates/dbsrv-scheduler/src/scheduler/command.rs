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

//! Yieldable command.

use std::fmt;

use super::id::{PacketId, Priority, SessionId};

// ----------------------------------------------------------------------------
// Enums
// ----------------------------------------------------------------------------

/// Outcome of a single cooperative step.
///
/// A [`Command`] is a state machine that advances in bounded slices, not a
/// coroutine — there is no per-task stack to suspend. `advance` runs for one
/// bounded slice and returns one of these two outcomes, or an error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    /// The statement has finished executing.
    Done,
    /// The statement ran out of its slice and must be resumed later, at
    /// whatever internal point it chose to suspend.
    Yielded,
}

// ----------------------------------------------------------------------------
// Traits
// ----------------------------------------------------------------------------

/// A partially-executed SQL statement that advances in bounded, yieldable
/// steps.
///
/// The dispatcher never holds a `Command` across event-loop polls except by
/// recording its owning session in [`Dispatcher::next_best_command`][]; the
/// command itself always lives inside the [`Session`][] that produced it.
///
/// [`Dispatcher::next_best_command`]: crate::scheduler::dispatcher::Dispatcher
/// [`Session`]: crate::scheduler::session::Session
pub trait Command: fmt::Debug {
    /// Identifier of the owning session.
    fn session_id(&self) -> SessionId;

    /// Packet identifier used to correlate a response with its request.
    fn packet_id(&self) -> PacketId;

    /// Current priority. Higher is more urgent.
    fn priority(&self) -> Priority;

    /// Raises or lowers the priority.
    ///
    /// Called by [`yield_if_needed`][] to claw back priority for a command
    /// that voluntarily relinquished the thread, so it eventually wins
    /// against peers of the same initial priority.
    ///
    /// [`yield_if_needed`]: crate::scheduler::yield_protocol::yield_if_needed
    fn set_priority(&mut self, priority: Priority);

    /// Runs one cooperative step.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] if the step fails. The tick driver routes the
    /// error to the owning session's `send_error` and drops the command; it
    /// never propagates past [`Tick::run`][].
    ///
    /// [`Tick::run`]: crate::scheduler::tick::Tick::run
    fn advance(&mut self) -> Result<Step, CommandError>;
}

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

/// Command execution error.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The statement exceeded the session's timeout budget while waiting to
    /// be selected for execution.
    #[error("statement timed out")]
    Timeout,

    /// The statement failed during execution.
    #[error("statement failed: {0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),
}
