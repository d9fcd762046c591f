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

//! Task queues: misc one-shots, periodic tasks, and the externally-defined
//! page-op / pending-transaction drains.

pub mod misc;
pub mod periodic;

pub use misc::{MiscHandle, MiscQueue};
pub use periodic::{PeriodicTaskId, PeriodicTasks};

use std::fmt;

/// An externally-defined drain hook the scheduler invokes in the prescribed
/// order but does not otherwise understand (`spec.md` §4.8: page-op,
/// pending-tx, pending-tasks).
///
/// Modeled uniformly since the scheduler treats all three identically: call
/// `drain` once per housekeeping pass and move on.
pub trait DrainHook: fmt::Debug {
    /// Runs one bounded slice of externally-defined work.
    fn drain(&mut self);
}
