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

//! Scheduler configuration.

use std::collections::HashMap;

use super::id::SchedulerId;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Scheduler construction parameters.
///
/// There is no configuration file or CLI surface as part of the core
/// (`spec.md` §6): configuration arrives as a key/value map, exactly the
/// shape a surrounding server process would assemble from its own config
/// layer before constructing a scheduler.
#[derive(Clone, Debug)]
pub struct Config {
    /// This scheduler's index within the fleet.
    pub id: SchedulerId,
    /// Total number of schedulers in the fleet, used to partition
    /// [`TransactionEngine::full_gc`][].
    ///
    /// [`TransactionEngine::full_gc`]: super::gc::TransactionEngine::full_gc
    pub scheduler_count: usize,
    /// Capacity of the event loop's readiness-event buffer.
    pub event_capacity: usize,
    /// Capacity of the misc-task cross-thread channel.
    pub misc_channel_capacity: usize,
    /// Ceiling permit rate for the session validator.
    pub validator_ceiling: f64,
}

impl Config {
    /// Builds a config from a key/value map, applying defaults for any key
    /// left unset.
    ///
    /// Recognized keys: `id`, `schedulerCount`, `eventCapacity`,
    /// `miscChannelCapacity`, `validatorCeiling`. Unrecognized keys are
    /// ignored rather than rejected, since an embedding server may pass
    /// through its own opaque event-loop tuning alongside these.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a recognized key's value
    /// fails to parse as its expected type.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Ok(Self {
            id: Self::parse_or(map, "id", 0)?,
            scheduler_count: Self::parse_or(map, "schedulerCount", 1)?,
            event_capacity: Self::parse_or(map, "eventCapacity", 1024)?,
            misc_channel_capacity: Self::parse_or(map, "miscChannelCapacity", 1024)?,
            validator_ceiling: Self::parse_or(map, "validatorCeiling", 8.0)?,
        })
    }

    fn parse_or<T: std::str::FromStr>(
        map: &HashMap<String, String>, key: &str, default: T,
    ) -> Result<T, ConfigError> {
        match map.get(key) {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key: key.to_string(), value: value.clone() }),
            None => Ok(default),
        }
    }
}

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

/// Error building a [`Config`] from a key/value map.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A recognized key held a value that failed to parse.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// The offending key.
        key: String,
        /// The offending value.
        value: String,
    },
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_map_uses_defaults() {
        let config = Config::from_map(&HashMap::new()).unwrap();
        assert_eq!(config.id, 0);
        assert_eq!(config.scheduler_count, 1);
    }

    #[test]
    fn recognized_keys_override_defaults() {
        let mut map = HashMap::new();
        map.insert("id".to_string(), "3".to_string());
        map.insert("schedulerCount".to_string(), "8".to_string());
        let config = Config::from_map(&map).unwrap();
        assert_eq!(config.id, 3);
        assert_eq!(config.scheduler_count, 8);
    }

    #[test]
    fn unrecognized_keys_are_ignored() {
        let mut map = HashMap::new();
        map.insert("someOpaqueEventLoopKnob".to_string(), "true".to_string());
        assert!(Config::from_map(&map).is_ok());
    }

    #[test]
    fn invalid_value_is_rejected() {
        let mut map = HashMap::new();
        map.insert("id".to_string(), "not-a-number".to_string());
        assert!(Config::from_map(&map).is_err());
    }
}
