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

//! Session registry.

use slab::Slab;
use std::time::Instant;

use super::Session;
use crate::scheduler::id::SessionId;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Session registry.
///
/// Backed by a [`Slab`] rather than the source's intrusive singly-linked
/// list (`spec.md` §9): session identifiers are stable slab keys, removal is
/// `O(1)`, and iteration never needs the "advance before unlink" discipline
/// an intrusive list requires, since the slab itself tolerates holes.
///
/// A scheduler exclusively owns its `Sessions` for the lifetime of every
/// session within it — sessions never migrate between schedulers.
#[derive(Debug, Default)]
pub struct Sessions {
    /// Live sessions, keyed by [`SessionId`].
    items: Slab<Box<dyn Session>>,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl Sessions {
    /// Creates an empty session registry.
    #[must_use]
    pub fn new() -> Self {
        Self { items: Slab::new() }
    }

    /// Registers a session, returning its assigned identifier.
    ///
    /// Called by the [`AcceptorBridge`][] once a [`SessionInitTask`][]
    /// completes the handshake.
    ///
    /// [`AcceptorBridge`]: crate::scheduler::acceptor::AcceptorBridge
    /// [`SessionInitTask`]: super::init::SessionInitTask
    pub fn add(&mut self, session: Box<dyn Session>) -> SessionId {
        self.items.insert(session)
    }

    /// Removes a session by identifier, returning it if present.
    pub fn remove(&mut self, id: SessionId) -> Option<Box<dyn Session>> {
        self.items.try_remove(id)
    }

    /// Returns a reference to the session with the given identifier.
    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<&dyn Session> {
        self.items.get(id).map(AsRef::as_ref)
    }

    /// Returns a mutable reference to the session with the given identifier.
    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut (dyn Session + 'static)> {
        self.items.get_mut(id).map(AsMut::as_mut)
    }

    /// Iterates over all sessions in registry order.
    pub fn iter(&self) -> impl Iterator<Item = (SessionId, &dyn Session)> {
        self.items.iter().map(|(id, session)| (id, session.as_ref()))
    }

    /// Iterates mutably over all sessions in registry order.
    pub fn for_each<F>(&mut self, mut f: F)
    where
        F: FnMut(SessionId, &mut dyn Session),
    {
        for (id, session) in self.items.iter_mut() {
            f(id, session.as_mut());
        }
    }

    /// Marks-closed every session whose last activity exceeds its timeout.
    ///
    /// Never removes a session during its own traversal — only marks it.
    /// Removal is deferred to [`Sessions::reap_closed`], called from the
    /// next admission pass.
    pub fn check_session_timeout(&mut self, now: Instant) {
        for (_, session) in self.items.iter_mut() {
            session.check_idle_timeout(now);
        }
    }

    /// Drains each session's per-session task queue once.
    pub fn run_session_tasks(&mut self) {
        for (_, session) in self.items.iter_mut() {
            session.run_session_tasks();
        }
    }

    /// Removes every mark-closed session whose queues have drained.
    ///
    /// Identifiers to remove are collected up front, so a session removed in
    /// this pass is never revisited within the same call.
    pub fn reap_closed(&mut self) -> usize {
        let ready: Vec<SessionId> = self
            .items
            .iter()
            .filter(|(_, session)| session.is_mark_closed() && session.queues_drained())
            .map(|(id, _)| id)
            .collect();
        for id in &ready {
            self.items.remove(*id);
        }
        ready.len()
    }

    /// Returns the number of live sessions, including mark-closed ones
    /// awaiting reap.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns whether the registry holds no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::scheduler::command::{Command, CommandError};
    use crate::scheduler::id::PacketId;
    use crate::scheduler::session::SessionState;

    #[derive(Debug)]
    struct StubSession {
        id: SessionId,
        state: SessionState,
        last_activity: Instant,
        timeout: Duration,
        drained: bool,
    }

    impl Session for StubSession {
        fn session_id(&self) -> SessionId {
            self.id
        }
        fn state(&self) -> SessionState {
            self.state
        }
        fn mark_closed(&mut self) {
            self.state = SessionState::MarkClosed;
        }
        fn last_activity(&self) -> Instant {
            self.last_activity
        }
        fn timeout(&self) -> Duration {
            self.timeout
        }
        fn queues_drained(&self) -> bool {
            self.drained
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

    fn stub(state: SessionState, drained: bool) -> Box<dyn Session> {
        Box::new(StubSession {
            id: 0,
            state,
            last_activity: Instant::now(),
            timeout: Duration::from_secs(30),
            drained,
        })
    }

    #[test]
    fn round_trips_add_and_remove() {
        let mut sessions = Sessions::new();
        let id = sessions.add(stub(SessionState::Open, true));
        assert_eq!(sessions.len(), 1);
        sessions.remove(id);
        assert!(sessions.is_empty());
    }

    #[test]
    fn reap_closed_skips_undrained_sessions() {
        let mut sessions = Sessions::new();
        let drained = sessions.add(stub(SessionState::Open, true));
        let undrained = sessions.add(stub(SessionState::Open, false));
        sessions.get_mut(drained).unwrap().mark_closed();
        sessions.get_mut(undrained).unwrap().mark_closed();
        let removed = sessions.reap_closed();
        assert_eq!(removed, 1);
        assert!(sessions.get(drained).is_none());
        assert!(sessions.get(undrained).is_some());
    }

    #[test]
    fn reap_closed_is_not_revisited_in_same_pass() {
        let mut sessions = Sessions::new();
        let ids: Vec<_> = (0..5)
            .map(|_| sessions.add(stub(SessionState::Open, true)))
            .collect();
        for id in &ids {
            sessions.get_mut(*id).unwrap().mark_closed();
        }
        assert_eq!(sessions.reap_closed(), 5);
        assert_eq!(sessions.reap_closed(), 0);
    }

    #[test]
    fn check_session_timeout_marks_without_removing() {
        let mut sessions = Sessions::new();
        let id = sessions.add(Box::new(StubSession {
            id: 0,
            state: SessionState::Open,
            last_activity: Instant::now() - Duration::from_secs(60),
            timeout: Duration::from_secs(1),
            drained: true,
        }));
        sessions.check_session_timeout(Instant::now());
        assert!(sessions.get(id).unwrap().is_mark_closed());
        assert_eq!(sessions.len(), 1);
    }
}
