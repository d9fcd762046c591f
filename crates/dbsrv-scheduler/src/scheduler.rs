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

//! The scheduler itself.

pub mod acceptor;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event_loop;
pub mod gc;
pub mod id;
pub mod queues;
pub mod session;
pub mod tick;
pub mod yield_protocol;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::{Interest, Token, Waker};
use tracing::warn;

use acceptor::{AcceptorBridge, AcceptorManager, ListenerSlot};
use config::Config;
use dispatcher::Dispatcher;
use error::SchedulerError;
use event_loop::{Connection, EventLoop};
use gc::{GcCoordinator, MemoryManager, TransactionEngine};
use id::{SchedulerId, SessionId};
use queues::misc::MiscTask;
use queues::periodic::{PeriodicTask, PeriodicTaskId};
use queues::{DrainHook, MiscHandle, MiscQueue, PeriodicTasks};
use session::init::SessionInitTask;
use session::validator::SessionValidator;
use session::{Session, Sessions};

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// A single-threaded cooperative worker owning a shard of client sessions.
///
/// See the crate root documentation for the shape of the problem this
/// solves. A `Scheduler` is constructed once per OS thread and then driven
/// by repeatedly calling [`Scheduler::tick`] until [`Scheduler::stop`] has
/// been observed.
pub struct Scheduler {
    config: Config,
    sessions: Sessions,
    validator: SessionValidator,
    init_queue: session::init::InitQueue,
    acceptor: AcceptorBridge,
    event_loop: EventLoop,
    dispatcher: Dispatcher,
    gc: GcCoordinator,
    misc: MiscQueue,
    periodic: PeriodicTasks,
    page_ops: Box<dyn DrainHook>,
    pending_tasks: Box<dyn DrainHook>,
    /// Base load contribution independent of session count, folded into
    /// [`Scheduler::get_load`].
    base_load: i64,
    /// Monotonic shutdown flag. Shared so an external coordinator thread can
    /// request shutdown; the scheduler itself only ever reads it, at the top
    /// of each iteration.
    stopped: Arc<AtomicBool>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("id", &self.config.id)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

/// Collaborators a [`Scheduler`] needs injected at construction.
///
/// Grouped into one argument rather than five positional parameters, since
/// every field here is a process-wide or fleet-wide singleton that would
/// otherwise be reached through a static accessor; the whole point of this
/// type is to make that dependency explicit at the call site.
pub struct Collaborators {
    /// Performs the accept syscall on behalf of the acceptor bridge.
    pub acceptor_manager: Box<dyn AcceptorManager>,
    /// Process-wide memory-pressure predicate.
    pub memory: Box<dyn MemoryManager>,
    /// Process-wide transaction engine.
    pub transactions: Box<dyn TransactionEngine>,
    /// Drains due page operations each housekeeping pass.
    pub page_ops: Box<dyn DrainHook>,
    /// Drains pending generic tasks each housekeeping pass.
    pub pending_tasks: Box<dyn DrainHook>,
}

impl Scheduler {
    /// Constructs a scheduler from configuration and its external
    /// collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying event-loop poller cannot be
    /// constructed.
    pub fn new(config: Config, collaborators: Collaborators) -> std::io::Result<Self> {
        let event_loop = EventLoop::new(config.event_capacity)?;
        let gc = GcCoordinator::new(
            config.id,
            config.scheduler_count,
            collaborators.memory,
            collaborators.transactions,
        );
        let validator = SessionValidator::new(config.validator_ceiling);
        let acceptor = AcceptorBridge::new(config.id, collaborators.acceptor_manager);
        let misc = MiscQueue::with_capacity(config.misc_channel_capacity, event_loop.waker());
        Ok(Self {
            sessions: Sessions::new(),
            validator,
            init_queue: session::init::InitQueue::new(),
            acceptor,
            event_loop,
            dispatcher: Dispatcher::new(),
            gc,
            misc,
            periodic: PeriodicTasks::new(),
            page_ops: collaborators.page_ops,
            pending_tasks: collaborators.pending_tasks,
            base_load: 0,
            stopped: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    /// This scheduler's index within the fleet.
    #[must_use]
    pub fn id(&self) -> SchedulerId {
        self.config.id
    }

    /// Returns a handle that can request shutdown from any thread.
    ///
    /// Setting it causes the current iteration to complete, then the event
    /// loop closes. Callers are expected to have quiesced the fleet before
    /// setting it; in-flight commands are dropped without response. Also
    /// wakes the event loop, so a blocked `poll` observes the request
    /// promptly rather than waiting out the idle poll deadline.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle { stopped: Arc::clone(&self.stopped), waker: self.event_loop.waker() }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    // -- Interfaces exposed to collaborators -----------------------------

    /// Submits a misc one-shot task and wakes the event loop if it is
    /// blocked in `poll`.
    ///
    /// Requires `&Scheduler`, which a foreign thread can never obtain since
    /// `Scheduler` is itself `!Sync`; callers on another thread should use
    /// [`Scheduler::misc_handle`] instead.
    pub fn handle(&self, task: MiscTask) -> bool {
        self.misc.handle(task)
    }

    /// Returns a cloneable, `Send + Sync` handle that can submit misc
    /// one-shot tasks from any thread, pairing submission with a loop
    /// wakeup the same way [`Scheduler::handle`] does.
    ///
    /// This is the only way to submit a misc task from a thread that does
    /// not already hold `&Scheduler` — the scheduler's collaborators carry
    /// no `Send + Sync` bounds, so `Scheduler` itself cannot be shared
    /// across threads. Mirrors [`Scheduler::stop_handle`].
    #[must_use]
    pub fn misc_handle(&self) -> MiscHandle {
        self.misc.handle_ref()
    }

    /// Registers a session, returning its assigned identifier.
    pub fn add_session(&mut self, session: Box<dyn Session>) -> SessionId {
        self.sessions.add(session)
    }

    /// Removes a session, returning it if present.
    pub fn remove_session(&mut self, id: SessionId) -> Option<Box<dyn Session>> {
        self.sessions.remove(id)
    }

    /// Registers a periodic task, returning an id usable with
    /// [`Scheduler::remove_periodic_task`]. Owner-thread only once the
    /// scheduler has started.
    pub fn add_periodic_task(&mut self, task: Box<dyn PeriodicTask>) -> PeriodicTaskId {
        self.periodic.add(task)
    }

    /// Unregisters a periodic task. Owner-thread only.
    pub fn remove_periodic_task(&mut self, id: PeriodicTaskId) -> Option<Box<dyn PeriodicTask>> {
        self.periodic.remove(id)
    }

    /// Enqueues a session-init task at the tail of the init queue.
    pub fn add_session_init_task(&mut self, task: Box<dyn SessionInitTask>) {
        self.init_queue.push(task);
    }

    /// Records the outcome of a credential check against this scheduler's
    /// session validator.
    pub fn validate_session(&mut self, is_auth_correct: bool) {
        self.validator.validate(is_auth_correct);
    }

    /// Registers a listen socket as eligible for this scheduler to accept
    /// on.
    pub fn register_accepter(&mut self, listener: Arc<ListenerSlot>) {
        self.acceptor.register(listener);
    }

    /// Binds a connection's I/O source to this scheduler's event loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS registration fails.
    pub fn register<S: mio::event::Source + ?Sized>(
        &self, source: &mut S, token: Token, interest: Interest,
    ) -> std::io::Result<()> {
        self.event_loop.register(source, token, interest)
    }

    /// Binds a connection's channel to this scheduler's event loop, returning
    /// the token to pass to [`Scheduler::deregister_connection`] on close.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS registration fails.
    pub fn register_connection(
        &mut self, connection: Box<dyn Connection>,
    ) -> std::io::Result<Token> {
        self.event_loop.register_connection(connection)
    }

    /// Removes a previously registered connection, returning it if present.
    pub fn deregister_connection(&mut self, token: Token) -> Option<Box<dyn Connection>> {
        self.event_loop.deregister_connection(token)
    }

    /// Gives an in-flight statement a safe point to relinquish the thread to
    /// a strictly higher-priority peer.
    ///
    /// Runs the same minimal housekeeping pass as a full tick, in the same
    /// order (acceptor, non-blocking selector check, readiness dispatch,
    /// drain writes, session-init, session-tasks, drain writes again), so a
    /// long-running statement that yields repeatedly still services socket
    /// readiness and admits new sessions in between its own steps. See
    /// [`yield_protocol::yield_if_needed`] for the priority comparison and
    /// clawback this delegates to once housekeeping is done.
    pub fn yield_if_needed(&mut self, current: yield_protocol::YieldContext) -> bool {
        let now = Instant::now();

        self.acceptor.admit_pending(&mut self.init_queue);
        if let Err(err) = self.event_loop.poll(Some(Duration::ZERO)) {
            warn!(error = %err, "event loop poll failed during yield housekeeping");
        }
        self.event_loop.dispatch_readiness();
        self.event_loop.drain_writes();
        if self.validator.can_handle_next() {
            match self.init_queue.attempt_next() {
                Some(session::init::InitAttemptResult::Admitted(session)) => {
                    self.sessions.add(session);
                }
                Some(session::init::InitAttemptResult::Rejected(err)) => {
                    warn!(error = %err, "session init failed during yield housekeeping");
                }
                None => {}
            }
        }
        self.sessions.run_session_tasks();
        self.event_loop.drain_writes();

        let sessions = &mut self.sessions;
        let dispatcher = &mut self.dispatcher;
        yield_protocol::yield_if_needed(current, sessions, dispatcher, now)
    }

    /// Current load: a fixed base contribution plus the number of live
    /// sessions.
    #[must_use]
    pub fn get_load(&self) -> i64 {
        self.base_load + i64::try_from(self.sessions.len()).unwrap_or(i64::MAX)
    }

    /// Drives this scheduler's main loop to completion.
    ///
    /// Runs [`tick::Tick`] iterations until a [`Scheduler::stop_handle`] has
    /// requested shutdown, then closes the event loop. Consumes `self`:
    /// there is nothing useful to do with a scheduler once its loop has
    /// exited.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying poller fails in a way that cannot
    /// be retried.
    pub fn run(mut self) -> Result<(), SchedulerError> {
        let mut tick = tick::Tick::new();
        while !self.is_stopped() {
            tick.run(&mut self).map_err(SchedulerError::EventLoop)?;
        }
        self.event_loop.close();
        Ok(())
    }
}

/// Thread-safe handle used to request a [`Scheduler`]'s shutdown.
#[derive(Clone)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl std::fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopHandle").finish_non_exhaustive()
    }
}

impl StopHandle {
    /// Requests shutdown. Idempotent; safe from any thread.
    ///
    /// Also wakes the event loop so a blocked `poll` notices the request
    /// without waiting out the idle poll deadline.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        let _ = self.waker.wake();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

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

    #[derive(Debug)]
    struct NoopTransactionEngine;
    impl TransactionEngine for NoopTransactionEngine {
        fn full_gc(&self, _total_schedulers: usize, _this_id: SchedulerId) {}
        fn run_pending_transactions(&self) {}
    }

    #[derive(Debug)]
    struct NoopDrain;
    impl DrainHook for NoopDrain {
        fn drain(&mut self) {}
    }

    fn test_scheduler() -> Scheduler {
        Scheduler::new(
            Config::from_map(&std::collections::HashMap::new()).unwrap(),
            Collaborators {
                acceptor_manager: Box::new(NoopAcceptorManager),
                memory: Box::new(NoopMemoryManager),
                transactions: Box::new(NoopTransactionEngine),
                page_ops: Box::new(NoopDrain),
                pending_tasks: Box::new(NoopDrain),
            },
        )
        .expect("scheduler construction")
    }

    #[test]
    fn get_load_reflects_live_session_count() {
        let scheduler = test_scheduler();
        assert_eq!(scheduler.get_load(), 0);
    }

    #[test]
    fn stop_handle_is_observed_by_the_scheduler() {
        let scheduler = test_scheduler();
        let handle = scheduler.stop_handle();
        assert!(!scheduler.is_stopped());
        handle.stop();
        assert!(scheduler.is_stopped());
    }

    #[test]
    fn stop_handle_wakes_a_blocked_poll() {
        let mut scheduler = test_scheduler();
        let handle = scheduler.stop_handle();
        handle.stop();
        let events =
            scheduler.event_loop.poll(Some(std::time::Duration::from_secs(5))).expect("poll");
        assert!(events.iter().next().is_some());
    }

    #[test]
    fn misc_handle_submits_from_a_foreign_thread_and_wakes_the_loop() {
        let mut scheduler = test_scheduler();
        let handle = scheduler.misc_handle();
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);
        std::thread::spawn(move || {
            assert!(handle.handle(Box::new(move || {
                ran_clone.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            })));
        })
        .join()
        .expect("submitting thread");
        let events =
            scheduler.event_loop.poll(Some(std::time::Duration::from_secs(5))).expect("poll");
        assert!(events.iter().next().is_some());
        scheduler.misc.drain_and_run();
        assert!(ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn yield_if_needed_runs_housekeeping_even_with_a_single_session() {
        let mut scheduler = test_scheduler();
        // Single-session yields never trigger the priority clawback, but the
        // housekeeping pass must still run unconditionally beforehand.
        let yielded =
            scheduler.yield_if_needed(yield_protocol::YieldContext { session_id: 0, priority: 0 });
        assert!(!yielded);
    }
}
