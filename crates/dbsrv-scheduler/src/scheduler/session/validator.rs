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

//! Session-init admission control.

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Tracks recent authentication failures and throttles session-init
/// admission in response.
///
/// Holds a permit budget replenished once per tick by `permit_rate`. A
/// failed [`SessionValidator::validate`] halves `permit_rate` down to
/// [`SessionValidator::floor`]; a success restores it linearly back toward
/// `ceiling`. `can_handle_next` is consulted before every init-task attempt
/// and the admission phase breaks out as soon as it returns false.
#[derive(Debug)]
pub struct SessionValidator {
    /// Permits available right now. One is spent per init-task attempt.
    permits: f64,
    /// Permits granted per tick. Decays geometrically on failure, restores
    /// linearly on success.
    permit_rate: f64,
    /// Floor `permit_rate` never drops below.
    floor: f64,
    /// Ceiling `permit_rate` restores toward.
    ceiling: f64,
    /// Amount `permit_rate` is restored by on each success.
    restore_step: f64,
}

impl SessionValidator {
    /// Creates a validator with the given ceiling permit rate.
    ///
    /// The floor defaults to a tenth of the ceiling and the restore step to
    /// a tenth of the ceiling as well, so roughly ten consecutive successes
    /// undo one collapse to the floor.
    #[must_use]
    pub fn new(ceiling: f64) -> Self {
        let floor = ceiling / 10.0;
        Self {
            permits: ceiling,
            permit_rate: ceiling,
            floor,
            ceiling,
            restore_step: ceiling / 10.0,
        }
    }

    /// Records the outcome of a credential check.
    ///
    /// On failure, `permit_rate` is halved (geometric decay) down to
    /// `floor`. On success, `permit_rate` moves linearly back toward
    /// `ceiling` by `restore_step`.
    pub fn validate(&mut self, is_correct: bool) {
        if is_correct {
            self.permit_rate = (self.permit_rate + self.restore_step).min(self.ceiling);
        } else {
            self.permit_rate = (self.permit_rate / 2.0).max(self.floor);
        }
    }

    /// Replenishes the permit budget by the current `permit_rate`.
    ///
    /// Called once per main-loop iteration before the admission phase.
    pub fn tick(&mut self) {
        self.permits = (self.permits + self.permit_rate).min(self.ceiling);
    }

    /// Returns whether another session-init task may be attempted this
    /// iteration, and if so spends one permit.
    pub fn can_handle_next(&mut self) -> bool {
        if self.permits >= 1.0 {
            self.permits -= 1.0;
            true
        } else {
            false
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
