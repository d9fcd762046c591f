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

//! Deferred session handshake.

use std::collections::VecDeque;
use std::fmt;

use super::Session;

// ----------------------------------------------------------------------------
// Enums
// ----------------------------------------------------------------------------

/// Result of one [`SessionInitTask::attempt`].
pub enum InitOutcome {
    /// The handshake finished; the produced session is ready for
    /// registration.
    Complete(Box<dyn Session>),
    /// The handshake cannot proceed and will never succeed.
    Failed(InitError),
    /// The handshake needs another attempt later. The task is requeued at
    /// the tail of the init queue.
    NotReady,
}

// ----------------------------------------------------------------------------
// Traits
// ----------------------------------------------------------------------------

/// A restartable unit of work that produces a [`Session`] once authentication
/// and protocol handshake complete.
///
/// Unlike the source's intrusive-list task (`spec.md` §3, §9), a task here
/// owns no link of its own: the init queue holds it by value in a
/// [`VecDeque`], so requeuing on [`InitOutcome::NotReady`] is a plain
/// push-to-back rather than a self-referencing splice.
pub trait SessionInitTask: fmt::Debug {
    /// Attempts to advance the handshake.
    ///
    /// Called by [`InitQueue::attempt_next`][] at most once per admitted
    /// slot, gated by [`SessionValidator::can_handle_next`][].
    ///
    /// [`InitQueue::attempt_next`]: InitQueue::attempt_next
    /// [`SessionValidator::can_handle_next`]: super::validator::SessionValidator::can_handle_next
    fn attempt(&mut self) -> InitOutcome;
}

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

/// Reason a [`SessionInitTask`] failed permanently.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// The handshake was rejected (bad credentials, protocol mismatch).
    #[error("handshake rejected: {0}")]
    Rejected(String),
    /// The underlying connection failed before the handshake completed.
    #[error("connection closed during handshake")]
    ConnectionClosed,
}

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// FIFO queue of pending [`SessionInitTask`]s.
///
/// Populated by the [`AcceptorBridge`][] after each accepted connection;
/// drained by the scheduler's admission phase, one task per loop iteration
/// while [`SessionValidator::can_handle_next`][] allows it.
///
/// [`AcceptorBridge`]: crate::scheduler::acceptor::AcceptorBridge
/// [`SessionValidator::can_handle_next`]: super::validator::SessionValidator::can_handle_next
#[derive(Debug, Default)]
pub struct InitQueue {
    tasks: VecDeque<Box<dyn SessionInitTask>>,
}

impl InitQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self { tasks: VecDeque::new() }
    }

    /// Enqueues a task at the tail.
    pub fn push(&mut self, task: Box<dyn SessionInitTask>) {
        self.tasks.push_back(task);
    }

    /// Returns the number of pending tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns whether the queue holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Attempts the task at the head of the queue, if any.
    ///
    /// On [`InitOutcome::NotReady`] the task is pushed back to the tail —
    /// copy-on-requeue with no self-reference, since the queue holds tasks
    /// by value. On [`InitOutcome::Complete`] or [`InitOutcome::Failed`] the
    /// task is dropped from the queue permanently.
    ///
    /// Returns `None` if the queue was empty or the popped task was not yet
    /// ready; otherwise returns the terminal outcome.
    pub fn attempt_next(&mut self) -> Option<InitAttemptResult> {
        let mut task = self.tasks.pop_front()?;
        match task.attempt() {
            InitOutcome::Complete(session) => Some(InitAttemptResult::Admitted(session)),
            InitOutcome::Failed(err) => Some(InitAttemptResult::Rejected(err)),
            InitOutcome::NotReady => {
                self.tasks.push_back(task);
                None
            }
        }
    }
}

/// Terminal result of [`InitQueue::attempt_next`].
pub enum InitAttemptResult {
    /// The handshake completed; the session is ready to register.
    Admitted(Box<dyn Session>),
    /// The handshake failed permanently.
    Rejected(InitError),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::scheduler::command::{Command, CommandError};
    use crate::scheduler::id::{PacketId, SessionId};
    use crate::scheduler::session::SessionState;
    use std::time::Duration;

    #[derive(Debug)]
    struct StubSession;

    impl Session for StubSession {
        fn session_id(&self) -> SessionId {
            0
        }
        fn state(&self) -> SessionState {
            SessionState::Open
        }
        fn mark_closed(&mut self) {}
        fn last_activity(&self) -> Instant {
            Instant::now()
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(30)
        }
        fn run_session_tasks(&mut self) {}
        fn clear_query_cache(&mut self) {}
        fn send_error(&mut self, _packet_id: PacketId, _err: &CommandError) {}
        fn yieldable_command(
            &mut self, _check_timeout: bool, _now: Instant,
        ) -> Option<&mut dyn Command> {
            None
        }
    }

    #[derive(Debug)]
    struct CountingTask {
        attempts_until_ready: usize,
    }

    impl SessionInitTask for CountingTask {
        fn attempt(&mut self) -> InitOutcome {
            if self.attempts_until_ready == 0 {
                InitOutcome::Complete(Box::new(StubSession))
            } else {
                self.attempts_until_ready -= 1;
                InitOutcome::NotReady
            }
        }
    }

    #[derive(Debug)]
    struct FailingTask;

    impl SessionInitTask for FailingTask {
        fn attempt(&mut self) -> InitOutcome {
            InitOutcome::Failed(InitError::ConnectionClosed)
        }
    }

    #[test]
    fn not_ready_requeues_at_tail_exactly_once() {
        let mut queue = InitQueue::new();
        queue.push(Box::new(CountingTask { attempts_until_ready: 2 }));
        assert!(queue.attempt_next().is_none());
        assert_eq!(queue.len(), 1);
        assert!(queue.attempt_next().is_none());
        assert_eq!(queue.len(), 1);
        match queue.attempt_next() {
            Some(InitAttemptResult::Admitted(_)) => {}
            _ => panic!("expected admission on third attempt"),
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn failed_task_is_dropped_not_requeued() {
        let mut queue = InitQueue::new();
        queue.push(Box::new(FailingTask));
        match queue.attempt_next() {
            Some(InitAttemptResult::Rejected(_)) => {}
            _ => panic!("expected rejection"),
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_queue_returns_none() {
        let mut queue = InitQueue::new();
        assert!(queue.attempt_next().is_none());
    }
}
