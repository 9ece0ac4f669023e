// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outbound side: pending messages and destination resolution.
//!
//! A resolver pass drains the queue, delivers every message whose client has
//! a known address, and puts the rest back (ahead of anything written during
//! the pass) after asking for a throttled discovery broadcast.

use crate::directory::DeviceDirectory;
use crate::discovery::DiscoveryThrottle;
use crate::message::Message;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Instant;

/// Messages waiting for their destination to resolve.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    messages: VecDeque<Message>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self {
            messages: VecDeque::new(),
        }
    }

    /// Append a message. Callers must have checked it carries a client.
    pub fn push(&mut self, message: Message) {
        self.messages.push_back(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Take every queued message, leaving the queue empty.
    fn snapshot(&mut self) -> VecDeque<Message> {
        std::mem::take(&mut self.messages)
    }

    /// Put unresolved messages back in front of newer arrivals.
    fn requeue_front(&mut self, mut kept: VecDeque<Message>) {
        kept.append(&mut self.messages);
        self.messages = kept;
    }

    /// Run one resolver pass.
    ///
    /// Known devices are addressed at their recorded IP on `device_port`.
    /// Delivered messages leave the queue immediately (fire-and-forget).
    pub fn resolve(
        &mut self,
        directory: &DeviceDirectory,
        throttle: &mut DiscoveryThrottle,
        device_port: u16,
        now: Instant,
    ) -> ResolvePlan {
        let mut plan = ResolvePlan::default();
        let mut kept = VecDeque::new();

        for message in self.snapshot() {
            let Some(client) = message.client().map(str::to_string) else {
                // write() never queues these
                tracing::warn!("Dropping outbound message without client: {}", message);
                continue;
            };

            match directory.lookup(&client) {
                Some(ip) => plan
                    .deliveries
                    .push((message, SocketAddr::new(ip, device_port))),
                None => {
                    if throttle.should_broadcast(&client, now) {
                        plan.discoveries.push(client);
                    }
                    kept.push_back(message);
                }
            }
        }

        plan.pending = kept.len();
        self.requeue_front(kept);
        plan
    }
}

/// Work produced by one resolver pass, executed outside the locks.
#[derive(Debug, Default, PartialEq)]
pub struct ResolvePlan {
    /// Messages to unicast, with their resolved destination.
    pub deliveries: Vec<(Message, SocketAddr)>,

    /// Clients to broadcast a `findclient` for.
    pub discoveries: Vec<String>,

    /// Messages left waiting for discovery.
    pub pending: usize,
}

impl ResolvePlan {
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty() && self.discoveries.is_empty()
    }
}
