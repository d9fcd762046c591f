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

//! One iteration of the scheduler's main loop.
//!
//! `spec.md` §2 fixes the per-iteration phase order; §4.5 fixes the inner
//! selection/execution loop `executeNextStatement` runs to pick and step one
//! command. Both live here rather than on [`Scheduler`] itself, since this
//! is the one module that legitimately needs every collaborator the
//! scheduler owns — splitting it across smaller modules would just move the
//! god-object problem around without reducing it.

use std::io;
use std::time::{Duration, Instant};

use tracing::warn;

use super::command::{CommandError, Step};
use super::session::init::InitAttemptResult;
use super::Scheduler;

/// Ceiling on how long a single [`crate::scheduler::event_loop::EventLoop::poll`]
/// may block when the scheduler has no outstanding work of its own.
///
/// Bounds the wait so periodic tasks and session timeouts are still serviced
/// on a quiescent scheduler, rather than polling forever for a readiness
/// event that may never come.
const MAX_IDLE_POLL: Duration = Duration::from_millis(100);

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Driver for one pass of [`Scheduler`]'s main loop.
///
/// Holds no state of its own — every piece of state `spec.md` §4.5 needs
/// across calls (`nextBestCommand`, the previous-command marker) already
/// lives on [`Scheduler::dispatcher`][]. `Tick` exists only to give the
/// per-iteration phase sequence a home distinct from `Scheduler`'s public
/// API surface.
///
/// [`Scheduler::dispatcher`]: super::Scheduler
#[derive(Debug, Default)]
pub struct Tick;

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl Tick {
    /// Creates a tick driver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Runs one full iteration of the main loop against `scheduler`.
    ///
    /// Follows `spec.md` §2's order exactly: admit listeners, admit sessions
    /// (throttled), drain misc one-shots, run due page operations, run
    /// per-session queued tasks, advance pending transactions, run pending
    /// generic tasks, dispatch the next command, then poll the event loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the event loop's poller fails for a reason other
    /// than an interrupted system call.
    pub fn run(&mut self, scheduler: &mut Scheduler) -> io::Result<()> {
        let now = Instant::now();

        scheduler.acceptor.admit_pending(&mut scheduler.init_queue);
        self.admit_sessions(scheduler);

        scheduler.misc.drain_and_run();
        scheduler.page_ops.drain();
        scheduler.sessions.run_session_tasks();
        scheduler.gc.run_pending_transactions();
        scheduler.pending_tasks.drain();

        // Per the open question in `spec.md` §9: periodic tasks are polled
        // once at loop top and bypassed entirely once shutdown has been
        // requested, so a throwing periodic task can never delay it.
        if !scheduler.is_stopped() {
            scheduler.periodic.run_due(now);
        }
        scheduler.sessions.check_session_timeout(now);
        scheduler.sessions.reap_closed();

        self.execute_next_statement(scheduler, now);

        let deadline = self.poll_deadline(scheduler);
        scheduler.event_loop.poll(deadline)?;
        scheduler.event_loop.dispatch_readiness();
        Ok(())
    }

    /// Admits session-init tasks while the validator's permit budget allows
    /// it, per `spec.md` §4.3.
    ///
    /// Stops as soon as the queue runs dry or the validator denies the next
    /// attempt — never spends a permit speculatively against an empty
    /// queue.
    fn admit_sessions(&mut self, scheduler: &mut Scheduler) {
        scheduler.validator.tick();
        while !scheduler.init_queue.is_empty() {
            if !scheduler.validator.can_handle_next() {
                break;
            }
            match scheduler.init_queue.attempt_next() {
                Some(InitAttemptResult::Admitted(session)) => {
                    scheduler.sessions.add(session);
                }
                Some(InitAttemptResult::Rejected(err)) => {
                    warn!(error = %err, "session init task failed permanently");
                }
                None => break,
            }
        }
    }

    /// `spec.md` §4.5's `executeNextStatement`: selects at most one command
    /// and runs it for a single bounded step.
    fn execute_next_statement(&mut self, scheduler: &mut Scheduler, now: Instant) {
        if scheduler.event_loop.is_queue_large() {
            scheduler.event_loop.drain_writes();
        }

        scheduler.gc.check(&mut scheduler.sessions);

        let mut candidate = scheduler.dispatcher.fill_cache(&mut scheduler.sessions, now);

        if candidate.is_none() {
            scheduler.sessions.run_session_tasks();
            candidate = scheduler.dispatcher.fill_cache(&mut scheduler.sessions, now);
        }

        if candidate.is_none() {
            self.deep_housekeeping(scheduler, now);
            candidate = scheduler.dispatcher.fill_cache(&mut scheduler.sessions, now);
        }

        let Some(session_id) = candidate else {
            return;
        };
        scheduler.dispatcher.clear_cache();

        let ran_previously = scheduler.dispatcher.ran_previously(session_id);
        let outcome = Self::advance_one_step(scheduler, session_id, now);

        match outcome {
            Some(Ok(_step)) => {
                scheduler.dispatcher.record_ran(session_id);
                // Anti-starvation: a steady stream of steps from the same
                // session must not starve housekeeping indefinitely.
                if ran_previously {
                    scheduler.page_ops.drain();
                    scheduler.sessions.run_session_tasks();
                    scheduler.misc.drain_and_run();
                }
            }
            Some(Err((packet_id, err))) => {
                if let Some(session) = scheduler.sessions.get_mut(session_id) {
                    session.send_error(packet_id, &err);
                }
            }
            // The session vanished (mark-closed and reaped) or its command
            // vanished between selection and execution; nothing to do.
            None => {}
        }
    }

    /// Runs one cooperative step of `session_id`'s current command, if both
    /// the session and its command are still present.
    fn advance_one_step(
        scheduler: &mut Scheduler, session_id: super::id::SessionId, now: Instant,
    ) -> Option<Result<Step, (super::id::PacketId, CommandError)>> {
        let session = scheduler.sessions.get_mut(session_id)?;
        let command = session.yieldable_command(false, now)?;
        let packet_id = command.packet_id();
        Some(command.advance().map_err(|err| (packet_id, err)))
    }

    /// `spec.md` §4.5 step 5's "deep housekeeping" sequence, run only when
    /// the fast path found no candidate command: acceptor, timeouts,
    /// periodic, page-ops, session-tasks, pending-tx, misc.
    fn deep_housekeeping(&mut self, scheduler: &mut Scheduler, now: Instant) {
        scheduler.acceptor.admit_pending(&mut scheduler.init_queue);
        scheduler.sessions.check_session_timeout(now);
        if !scheduler.is_stopped() {
            scheduler.periodic.run_due(now);
        }
        scheduler.page_ops.drain();
        scheduler.sessions.run_session_tasks();
        scheduler.gc.run_pending_transactions();
        scheduler.misc.drain_and_run();
    }

    /// Chooses how long the closing event-loop poll may block.
    ///
    /// Non-blocking whenever there is local work still worth revisiting
    /// this tick (a live session, a pending init task, or a misc task that
    /// arrived mid-iteration); otherwise bounded by [`MAX_IDLE_POLL`] so a
    /// fully idle scheduler still services periodic tasks and timeouts.
    fn poll_deadline(&self, scheduler: &Scheduler) -> Option<Duration> {
        let idle =
            scheduler.sessions.is_empty() && scheduler.misc.is_empty() && scheduler.init_queue.is_empty();
        Some(if idle { MAX_IDLE_POLL } else { Duration::ZERO })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::scheduler::acceptor::{AcceptorManager, ListenerSlot};
    use crate::scheduler::command::{Command, CommandError};
    use crate::scheduler::config::Config;
    use crate::scheduler::gc::{MemoryManager, TransactionEngine};
    use crate::scheduler::id::{PacketId, Priority, SchedulerId, SessionId};
    use crate::scheduler::queues::DrainHook;
    use crate::scheduler::session::init::{InitOutcome, SessionInitTask};
    use crate::scheduler::session::{Session, SessionState};
    use crate::scheduler::{Collaborators, Scheduler};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct NoopAcceptorManager;
    impl AcceptorManager for NoopAcceptorManager {
        fn register_accepter(&mut self, _scheduler_id: SchedulerId) {}
        fn run_register_accepter_tasks(&mut self, _scheduler_id: SchedulerId) {}
        fn accept(
            &mut self, _listener: &Arc<ListenerSlot>, _scheduler_id: SchedulerId,
        ) -> Option<Box<dyn SessionInitTask>> {
            None
        }
    }

    #[derive(Debug)]
    struct NoopMemoryManager;
    impl MemoryManager for NoopMemoryManager {
        fn need_full_gc(&self) -> bool {
            false
        }
    }

    #[derive(Debug, Default)]
    struct CountingTransactionEngine {
        pending_runs: Arc<AtomicUsize>,
    }
    impl TransactionEngine for CountingTransactionEngine {
        fn full_gc(&self, _total_schedulers: usize, _this_id: SchedulerId) {}
        fn run_pending_transactions(&self) {
            self.pending_runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Debug, Default)]
    struct NoopDrain {
        calls: Arc<AtomicUsize>,
    }
    impl DrainHook for NoopDrain {
        fn drain(&mut self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn test_scheduler() -> Scheduler {
        Scheduler::new(
            Config::from_map(&std::collections::HashMap::new()).unwrap(),
            Collaborators {
                acceptor_manager: Box::new(NoopAcceptorManager),
                memory: Box::new(NoopMemoryManager),
                transactions: Box::new(CountingTransactionEngine::default()),
                page_ops: Box::new(NoopDrain::default()),
                pending_tasks: Box::new(NoopDrain::default()),
            },
        )
        .expect("scheduler construction")
    }

    #[derive(Debug)]
    struct StubCommand {
        session_id: SessionId,
        priority: Priority,
        steps: usize,
        fail: bool,
    }

    impl Command for StubCommand {
        fn session_id(&self) -> SessionId {
            self.session_id
        }
        fn packet_id(&self) -> PacketId {
            7
        }
        fn priority(&self) -> Priority {
            self.priority
        }
        fn set_priority(&mut self, priority: Priority) {
            self.priority = priority;
        }
        fn advance(&mut self) -> Result<Step, CommandError> {
            if self.fail {
                return Err(CommandError::Failed("boom".into()));
            }
            if self.steps > 0 {
                self.steps -= 1;
            }
            if self.steps == 0 {
                Ok(Step::Done)
            } else {
                Ok(Step::Yielded)
            }
        }
    }

    /// Shared sink a [`StubSession`] reports into, since the registry only
    /// ever hands tests back a `&dyn Session` — this is how a test observes
    /// what happened to a session after it is boxed and registered.
    #[derive(Debug, Default)]
    struct Observed {
        last_error: std::sync::Mutex<Option<(PacketId, String)>>,
        tasks_run: AtomicUsize,
    }

    #[derive(Debug)]
    struct StubSession {
        id: SessionId,
        state: SessionState,
        command: Option<StubCommand>,
        observed: Arc<Observed>,
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
            Instant::now()
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(30)
        }
        fn run_session_tasks(&mut self) {
            self.observed.tasks_run.fetch_add(1, Ordering::SeqCst);
        }
        fn clear_query_cache(&mut self) {}
        fn send_error(&mut self, packet_id: PacketId, err: &CommandError) {
            *self.observed.last_error.lock().unwrap() = Some((packet_id, err.to_string()));
        }
        fn yieldable_command(
            &mut self, _check_timeout: bool, _now: Instant,
        ) -> Option<&mut dyn Command> {
            self.command.as_mut().map(|c| c as &mut dyn Command)
        }
    }

    #[derive(Debug)]
    struct ReadyTask {
        session_id: SessionId,
    }
    impl SessionInitTask for ReadyTask {
        fn attempt(&mut self) -> InitOutcome {
            InitOutcome::Complete(Box::new(StubSession {
                id: self.session_id,
                state: SessionState::Open,
                command: None,
                observed: Arc::new(Observed::default()),
            }))
        }
    }

    #[test]
    fn empty_registry_returns_without_invoking_any_command() {
        let mut scheduler = test_scheduler();
        let mut tick = Tick::new();
        let result = tick.run(&mut scheduler);
        assert!(result.is_ok());
        assert!(scheduler.sessions.is_empty());
    }

    #[test]
    fn admits_a_session_init_task_up_to_the_validator_budget() {
        let mut scheduler = test_scheduler();
        scheduler.add_session_init_task(Box::new(ReadyTask { session_id: 0 }));
        let mut tick = Tick::new();
        tick.admit_sessions(&mut scheduler);
        assert_eq!(scheduler.sessions.len(), 1);
    }

    #[test]
    fn runs_the_highest_priority_command_one_step() {
        let mut scheduler = test_scheduler();
        let observed = Arc::new(Observed::default());
        let id = scheduler.sessions.add(Box::new(StubSession {
            id: 0,
            state: SessionState::Open,
            command: Some(StubCommand { session_id: 0, priority: 5, steps: 2, fail: false }),
            observed: Arc::clone(&observed),
        }));
        let mut tick = Tick::new();
        tick.execute_next_statement(&mut scheduler, Instant::now());
        assert!(scheduler.dispatcher.ran_previously(id));
        assert!(observed.last_error.lock().unwrap().is_none());
    }

    #[test]
    fn a_failing_command_reports_the_error_and_is_dropped() {
        let mut scheduler = test_scheduler();
        let observed = Arc::new(Observed::default());
        let id = scheduler.sessions.add(Box::new(StubSession {
            id: 0,
            state: SessionState::Open,
            command: Some(StubCommand { session_id: 0, priority: 5, steps: 1, fail: true }),
            observed: Arc::clone(&observed),
        }));
        let mut tick = Tick::new();
        tick.execute_next_statement(&mut scheduler, Instant::now());
        let (packet_id, message) = observed.last_error.lock().unwrap().clone().expect("error reported");
        assert_eq!(packet_id, 7);
        assert!(message.contains("boom"));
        assert!(scheduler.sessions.get(id).is_some());
    }

    #[test]
    fn mark_closed_sessions_are_skipped_by_dispatch() {
        let mut scheduler = test_scheduler();
        let observed = Arc::new(Observed::default());
        let id = scheduler.sessions.add(Box::new(StubSession {
            id: 0,
            state: SessionState::MarkClosed,
            command: Some(StubCommand { session_id: 0, priority: 100, steps: 5, fail: false }),
            observed,
        }));
        let mut tick = Tick::new();
        tick.execute_next_statement(&mut scheduler, Instant::now());
        assert!(!scheduler.dispatcher.ran_previously(id));
    }

    #[test]
    fn a_steady_stream_from_one_session_interleaves_housekeeping() {
        let mut scheduler = test_scheduler();
        let observed = Arc::new(Observed::default());
        scheduler.sessions.add(Box::new(StubSession {
            id: 0,
            state: SessionState::Open,
            command: Some(StubCommand { session_id: 0, priority: 5, steps: 10, fail: false }),
            observed: Arc::clone(&observed),
        }));
        let mut tick = Tick::new();
        let now = Instant::now();
        tick.execute_next_statement(&mut scheduler, now);
        tick.execute_next_statement(&mut scheduler, now);
        // The second step selects the same session as the first, so
        // housekeeping interleaves and the session's own task queue runs.
        assert!(observed.tasks_run.load(Ordering::SeqCst) >= 1);
    }
}
