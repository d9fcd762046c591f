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

//! Event loop.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use mio::event::Source;
use mio::{Events, Interest, Poll, Token, Waker};
use slab::Slab;

/// Token reserved for the cross-thread wakeup registration.
const WAKE_TOKEN: Token = Token(usize::MAX);

/// Queue-depth past which [`EventLoop::is_queue_large`] reports backpressure.
const BACKPRESSURE_THRESHOLD: usize = 4096;

// ----------------------------------------------------------------------------
// Traits
// ----------------------------------------------------------------------------

/// A readiness-driven outbound byte sink the event loop drains each pass.
///
/// Bound to a [`mio::Token`] at [`EventLoop::register`] time; the scheduler
/// never inspects the connection's internals beyond this contract.
pub trait Connection: fmt::Debug {
    /// Registers this connection's I/O source with the poller.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying OS registration fails.
    fn register(&mut self, poll: &Poll, token: Token) -> io::Result<()>;

    /// Handles a readiness event addressed to this connection's token.
    fn handle_readiness(&mut self, readable: bool, writable: bool);

    /// Flushes queued outbound bytes, returning the number of bytes still
    /// pending after the attempt.
    fn write(&mut self) -> usize;
}

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Non-blocking socket readiness multiplexer.
///
/// Wraps a single [`mio::Poll`]; the only blocking call the scheduler makes.
/// Every registered connection is looked up by its [`Token`] when a
/// readiness event fires.
///
/// Grounded in the session/poll pairing `other_examples` shows for `mio`
/// (`register_readable`/`reregister_writable` against a shared [`Poll`]),
/// adapted to the scheduler's one-poll-per-thread ownership model.
pub struct EventLoop {
    poll: Poll,
    waker: Arc<Waker>,
    events: Events,
    queued_writes: usize,
    /// Connections registered via [`EventLoop::register_connection`], keyed
    /// by the [`Token`] handed back at registration time.
    connections: Slab<Box<dyn Connection>>,
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("queued_writes", &self.queued_writes)
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}

impl EventLoop {
    /// Creates an event loop with its wakeup handle pre-registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying poller or waker cannot be
    /// constructed.
    pub fn new(event_capacity: usize) -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        Ok(Self {
            poll,
            waker,
            events: Events::with_capacity(event_capacity),
            queued_writes: 0,
            connections: Slab::new(),
        })
    }

    /// Binds a connection's I/O source to this loop under `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the registration with the OS poller fails.
    pub fn register<S: Source + ?Sized>(
        &self, source: &mut S, token: Token, interest: Interest,
    ) -> io::Result<()> {
        self.poll.registry().register(source, token, interest)
    }

    /// Returns a handle that can wake a blocked [`EventLoop::poll`] from any
    /// thread.
    ///
    /// The returned `Arc` is cheap to clone and share; `mio::Waker` is
    /// itself thread-safe, so any number of owners can call `wake()`
    /// concurrently.
    #[must_use]
    pub fn waker(&self) -> Arc<Waker> {
        Arc::clone(&self.waker)
    }

    /// Wakes a blocked poll, causing it to return promptly. Safe to call
    /// from any thread, including the scheduler's own.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying wake syscall fails.
    pub fn wake_up(&self) -> io::Result<()> {
        self.waker.wake()
    }

    /// Blocks until `deadline` elapses or a readiness/wakeup event arrives,
    /// then returns the fired tokens.
    ///
    /// Returns an empty slice on a spurious wakeup or a pure timeout; the
    /// caller distinguishes wakeup-only events by token value
    /// ([`WAKE_TOKEN`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying poll syscall fails for a reason
    /// other than an interrupted system call, which is retried internally.
    pub fn poll(&mut self, deadline: Option<Duration>) -> io::Result<&Events> {
        loop {
            match self.poll.poll(&mut self.events, deadline) {
                Ok(()) => return Ok(&self.events),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Records `count` bytes as newly queued for write, used by
    /// [`EventLoop::is_queue_large`] to signal backpressure.
    pub fn note_queued(&mut self, count: usize) {
        self.queued_writes += count;
    }

    /// Records that `count` previously-queued bytes have drained.
    pub fn note_drained(&mut self, count: usize) {
        self.queued_writes = self.queued_writes.saturating_sub(count);
    }

    /// Returns whether the outbound queue is large enough that the
    /// dispatcher should drain writes before considering new commands
    /// (`spec.md` §4.5 step 1).
    #[must_use]
    pub fn is_queue_large(&self) -> bool {
        self.queued_writes > BACKPRESSURE_THRESHOLD
    }

    /// Registers a connection's channel with this loop, per `spec.md` §4.1's
    /// `register(connection)`.
    ///
    /// Returns the [`Token`] the connection was bound under, handed back to
    /// [`EventLoop::deregister_connection`] when the connection closes.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying OS registration fails; the
    /// connection is not retained on failure.
    pub fn register_connection(
        &mut self, mut connection: Box<dyn Connection>,
    ) -> io::Result<Token> {
        let entry = self.connections.vacant_entry();
        let token = Token(entry.key());
        connection.register(&self.poll, token)?;
        entry.insert(connection);
        Ok(token)
    }

    /// Removes a previously registered connection, returning it if present.
    pub fn deregister_connection(&mut self, token: Token) -> Option<Box<dyn Connection>> {
        self.connections.try_remove(token.0)
    }

    /// Routes the readiness events from the most recent [`EventLoop::poll`]
    /// to each connection's [`Connection::handle_readiness`].
    ///
    /// Skips [`WAKE_TOKEN`] and any token whose connection has since been
    /// deregistered (a benign race with the connection closing on its own).
    pub fn dispatch_readiness(&mut self) {
        for event in &self.events {
            let token = event.token();
            if token == WAKE_TOKEN {
                continue;
            }
            if let Some(connection) = self.connections.get_mut(token.0) {
                connection.handle_readiness(event.is_readable(), event.is_writable());
            }
        }
    }

    /// Flushes every registered connection's queued outbound bytes,
    /// recomputing the aggregate backpressure counter from what remains.
    ///
    /// Equivalent to `spec.md` §4.1's `write()`.
    pub fn drain_writes(&mut self) {
        let mut remaining = 0;
        for (_, connection) in &mut self.connections {
            remaining += connection.write();
        }
        self.queued_writes = remaining;
    }

    /// Deregisters every interest and releases the underlying poller.
    ///
    /// Called once, at shutdown, after the final loop iteration completes.
    pub fn close(self) {
        drop(self.connections);
        drop(self.poll);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_loop_has_no_backpressure() {
        let event_loop = EventLoop::new(128).expect("poll construction");
        assert!(!event_loop.is_queue_large());
    }

    #[test]
    fn queueing_past_threshold_signals_backpressure() {
        let mut event_loop = EventLoop::new(128).expect("poll construction");
        event_loop.note_queued(BACKPRESSURE_THRESHOLD + 1);
        assert!(event_loop.is_queue_large());
        event_loop.note_drained(BACKPRESSURE_THRESHOLD + 1);
        assert!(!event_loop.is_queue_large());
    }

    #[derive(Debug, Default)]
    struct FakeConnection {
        readable_calls: usize,
        writable_calls: usize,
        pending: usize,
    }

    impl Connection for FakeConnection {
        fn register(&mut self, _poll: &Poll, _token: Token) -> io::Result<()> {
            Ok(())
        }
        fn handle_readiness(&mut self, readable: bool, writable: bool) {
            if readable {
                self.readable_calls += 1;
            }
            if writable {
                self.writable_calls += 1;
            }
        }
        fn write(&mut self) -> usize {
            self.pending
        }
    }

    #[test]
    fn drain_writes_aggregates_remaining_bytes_across_connections() {
        let mut event_loop = EventLoop::new(128).expect("poll construction");
        event_loop
            .register_connection(Box::new(FakeConnection { pending: 10, ..Default::default() }))
            .expect("register");
        event_loop
            .register_connection(Box::new(FakeConnection { pending: 5, ..Default::default() }))
            .expect("register");
        event_loop.drain_writes();
        assert!(!event_loop.is_queue_large());
        event_loop.note_queued(BACKPRESSURE_THRESHOLD * 2);
        event_loop.drain_writes();
        assert_eq!(event_loop.queued_writes, 15);
    }

    #[test]
    fn deregistering_a_connection_removes_it_from_the_registry() {
        let mut event_loop = EventLoop::new(128).expect("poll construction");
        let token = event_loop
            .register_connection(Box::new(FakeConnection::default()))
            .expect("register");
        assert!(event_loop.deregister_connection(token).is_some());
        assert!(event_loop.deregister_connection(token).is_none());
    }

    #[test]
    fn wake_up_returns_promptly_from_a_blocked_poll() {
        let mut event_loop = EventLoop::new(128).expect("poll construction");
        event_loop.wake_up().expect("wake");
        let events = event_loop.poll(Some(Duration::from_secs(5))).expect("poll");
        assert!(events.iter().any(|event| event.token() == WAKE_TOKEN));
    }

    #[test]
    fn poll_with_no_events_respects_timeout() {
        let mut event_loop = EventLoop::new(128).expect("poll construction");
        let start = std::time::Instant::now();
        let events = event_loop.poll(Some(Duration::from_millis(20))).expect("poll");
        assert!(events.iter().next().is_none());
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
