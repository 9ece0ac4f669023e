// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway activity counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated by the gateway loops.
#[derive(Debug, Default)]
pub struct GatewayStats {
    pub(crate) datagrams_received: AtomicU64,
    pub(crate) malformed_datagrams: AtomicU64,
    pub(crate) hub_replies: AtomicU64,
    pub(crate) identifications: AtomicU64,
    pub(crate) inbound_dropped: AtomicU64,
    pub(crate) messages_dispatched: AtomicU64,
    pub(crate) callback_panics: AtomicU64,
    pub(crate) messages_sent: AtomicU64,
    pub(crate) discovery_broadcasts: AtomicU64,
    pub(crate) send_errors: AtomicU64,
    pub(crate) rejected_writes: AtomicU64,
}

impl GatewayStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            datagrams_received: load(&self.datagrams_received),
            malformed_datagrams: load(&self.malformed_datagrams),
            hub_replies: load(&self.hub_replies),
            identifications: load(&self.identifications),
            inbound_dropped: load(&self.inbound_dropped),
            messages_dispatched: load(&self.messages_dispatched),
            callback_panics: load(&self.callback_panics),
            messages_sent: load(&self.messages_sent),
            discovery_broadcasts: load(&self.discovery_broadcasts),
            send_errors: load(&self.send_errors),
            rejected_writes: load(&self.rejected_writes),
        }
    }
}

/// Counter values at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StatsSnapshot {
    /// Datagrams read from the socket, malformed ones included.
    pub datagrams_received: u64,
    pub malformed_datagrams: u64,
    /// `hubid` replies sent for `findhub` requests.
    pub hub_replies: u64,
    /// `clientid` announcements processed.
    pub identifications: u64,
    /// Inbound messages evicted because the queue was full.
    pub inbound_dropped: u64,
    /// Messages popped by the dispatcher.
    pub messages_dispatched: u64,
    pub callback_panics: u64,
    /// Outbound messages delivered to a resolved address.
    pub messages_sent: u64,
    pub discovery_broadcasts: u64,
    pub send_errors: u64,
    /// `write` calls refused for lack of a client.
    pub rejected_writes: u64,
}
