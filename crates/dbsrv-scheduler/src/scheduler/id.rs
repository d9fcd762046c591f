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

//! Identifiers.

/// Session identifier.
///
/// Sessions live in a [`slab::Slab`], so their identifier is the slab key —
/// stable for the lifetime of the session, reused only after removal.
///
/// [`slab::Slab`]: slab::Slab
pub type SessionId = usize;

/// Scheduler identifier.
///
/// Assigned once at construction from the configuration map (`id`), and used
/// unchanged to partition [`TransactionEngine::full_gc`][] across the fleet.
///
/// [`TransactionEngine::full_gc`]: crate::scheduler::gc::TransactionEngine::full_gc
pub type SchedulerId = usize;

/// Packet identifier.
///
/// Correlates a [`Command`][]'s response with the wire-protocol request that
/// produced it. Opaque to the scheduler beyond being passed back verbatim to
/// [`Session::send_error`][].
///
/// [`Command`]: crate::scheduler::command::Command
/// [`Session::send_error`]: crate::scheduler::session::Session::send_error
pub type PacketId = u64;

/// Command priority.
///
/// Higher values are more urgent. Priorities are compared with strict
/// greater-than throughout the dispatcher, so equal priorities never
/// displace an already-selected candidate — ties resolve to whichever
/// session was seen first in registry order.
pub type Priority = i64;

/// Default priority assigned to a freshly produced [`Command`][], and the
/// sentinel floor below which [`Dispatcher::get_next_best_command`][] never
/// selects.
///
/// [`Command`]: crate::scheduler::command::Command
/// [`Dispatcher::get_next_best_command`]: crate::scheduler::dispatcher::Dispatcher::get_next_best_command
pub const MIN_PRIORITY: Priority = 0;
