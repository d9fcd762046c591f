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

//! Per-thread cooperative scheduler for a database server's request/response
//! loop.
//!
//! A [`Scheduler`][] owns a shard of client sessions, multiplexes their
//! non-blocking socket I/O, admits new connections under rate-limited
//! authentication, executes SQL commands in small yieldable steps, and
//! interleaves periodic housekeeping between statements. A fleet of
//! schedulers, each pinned to one OS thread, forms a server's execution
//! substrate; this crate covers a single scheduler plus the small amount of
//! fleet-level coordination it needs — acceptor handoff and cross-scheduler
//! GC quiescence.
//!
//! [`Scheduler`]: scheduler::Scheduler

pub mod scheduler;

pub use scheduler::Scheduler;
