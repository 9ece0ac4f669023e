// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rate limiting of `findclient` discovery broadcasts.
//!
//! Many queued messages for one unknown client must not turn into a
//! broadcast storm. An attempt is stamped only when a broadcast is allowed.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Per-client throttle for discovery broadcasts.
#[derive(Debug)]
pub struct DiscoveryThrottle {
    delay: Duration,
    attempts: HashMap<String, Instant>,
}

impl DiscoveryThrottle {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            attempts: HashMap::new(),
        }
    }

    /// Decide whether a `findclient` for `client` may go out at `now`.
    ///
    /// Returns `true` (and records `now`) when there was no previous attempt
    /// or the previous one is older than the configured delay.
    pub fn should_broadcast(&mut self, client: &str, now: Instant) -> bool {
        if let Some(last) = self.attempts.get(client) {
            if now.saturating_duration_since(*last) <= self.delay {
                return false;
            }
        }
        self.attempts.insert(client.to_string(), now);
        true
    }

    /// Time of the last broadcast for `client`.
    pub fn last_attempt(&self, client: &str) -> Option<Instant> {
        self.attempts.get(client).copied()
    }
}
