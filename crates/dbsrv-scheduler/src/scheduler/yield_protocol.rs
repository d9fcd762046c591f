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

//! Voluntary mid-statement yield.

use std::time::Instant;

use super::dispatcher::Dispatcher;
use super::id::SessionId;
use super::session::Sessions;

/// Context a running statement passes to [`yield_if_needed`] describing
/// itself.
#[derive(Clone, Copy, Debug)]
pub struct YieldContext {
    /// Session owning the calling statement.
    pub session_id: SessionId,
    /// The calling statement's priority at the instant of the call.
    pub priority: i64,
}

/// Gives an in-flight statement a safe point at which to relinquish the
/// thread to a strictly higher-priority peer.
///
/// This is head-of-line avoidance without preemption (`spec.md` §4.6): a
/// long-running statement calls this between bounded steps; if a more
/// urgent peer is waiting, the statement's priority is bumped by one
/// (clawback) and the call returns `true`, meaning the caller must return
/// control up to the dispatcher rather than continuing its own step.
///
/// The minimal housekeeping pass the source runs at each yield point
/// (acceptor, non-blocking selector check, readiness dispatch, drain
/// writes, session-init, session-tasks, drain writes again) is the caller's
/// responsibility, run before this function is called, since it needs
/// collaborators this module has no reason to hold directly. See
/// [`Scheduler::yield_if_needed`][].
///
/// [`Scheduler::yield_if_needed`]: crate::scheduler::Scheduler::yield_if_needed
pub fn yield_if_needed(
    current: YieldContext, sessions: &mut Sessions, dispatcher: &mut Dispatcher, now: Instant,
) -> bool {
    if sessions.len() < 2 {
        return false;
    }

    let winner = dispatcher.get_next_best_command(
        sessions, Some(current.session_id), current.priority, false, now,
    );

    match winner {
        Some(session_id) => {
            dispatcher.set_cached(session_id);
            if let Some(session) = sessions.get_mut(current.session_id) {
                if let Some(command) = session.yieldable_command(false, now) {
                    command.set_priority(current.priority + 1);
                }
            }
            true
        }
        None => false,
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::scheduler::command::{Command, CommandError, Step};
    use crate::scheduler::id::PacketId;
    use crate::scheduler::session::{Session, SessionState};

    #[derive(Debug)]
    struct StubCommand {
        session_id: SessionId,
        priority: i64,
    }

    impl Command for StubCommand {
        fn session_id(&self) -> SessionId {
            self.session_id
        }
        fn packet_id(&self) -> PacketId {
            0
        }
        fn priority(&self) -> i64 {
            self.priority
        }
        fn set_priority(&mut self, priority: i64) {
            self.priority = priority;
        }
        fn advance(&mut self) -> Result<Step, CommandError> {
            Ok(Step::Done)
        }
    }

    #[derive(Debug)]
    struct StubSession {
        id: SessionId,
        command: Option<StubCommand>,
    }

    impl Session for StubSession {
        fn session_id(&self) -> SessionId {
            self.id
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
            self.command.as_mut().map(|c| c as &mut dyn Command)
        }
    }

    #[test]
    fn single_session_never_yields() {
        let mut sessions = Sessions::new();
        let a = sessions.add(Box::new(StubSession {
            id: 0,
            command: Some(StubCommand { session_id: 0, priority: 5 }),
        }));
        let mut dispatcher = Dispatcher::new();
        let yielded = yield_if_needed(
            YieldContext { session_id: a, priority: 5 },
            &mut sessions,
            &mut dispatcher,
            Instant::now(),
        );
        assert!(!yielded);
    }

    #[test]
    fn higher_priority_peer_triggers_yield_and_clawback() {
        let mut sessions = Sessions::new();
        let a = sessions.add(Box::new(StubSession {
            id: 0,
            command: Some(StubCommand { session_id: 0, priority: 5 }),
        }));
        sessions.add(Box::new(StubSession {
            id: 0,
            command: Some(StubCommand { session_id: 0, priority: 9 }),
        }));
        let mut dispatcher = Dispatcher::new();
        let yielded = yield_if_needed(
            YieldContext { session_id: a, priority: 5 },
            &mut sessions,
            &mut dispatcher,
            Instant::now(),
        );
        assert!(yielded);
        let a_priority = sessions
            .get_mut(a)
            .unwrap()
            .yieldable_command(false, Instant::now())
            .unwrap()
            .priority();
        assert_eq!(a_priority, 6);
    }

    #[test]
    fn equal_priority_peer_does_not_trigger_yield() {
        let mut sessions = Sessions::new();
        let a = sessions.add(Box::new(StubSession {
            id: 0,
            command: Some(StubCommand { session_id: 0, priority: 5 }),
        }));
        sessions.add(Box::new(StubSession {
            id: 0,
            command: Some(StubCommand { session_id: 0, priority: 5 }),
        }));
        let mut dispatcher = Dispatcher::new();
        let yielded = yield_if_needed(
            YieldContext { session_id: a, priority: 5 },
            &mut sessions,
            &mut dispatcher,
            Instant::now(),
        );
        assert!(!yielded);
    }
}
