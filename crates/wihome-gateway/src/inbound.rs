// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound side: bounded receive queue, subscriber filters and dispatch.

use crate::message::{json_kind, Message};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

/// Subscriber callback invoked with every matching inbound message.
pub type RxCallback = Arc<dyn Fn(&Message) + Send + Sync>;

// ============================================================================
// Inbound queue
// ============================================================================

/// FIFO of received application messages holding at most `capacity` entries.
///
/// Pushing onto a full queue evicts the oldest message.
#[derive(Debug)]
pub struct InboundQueue {
    messages: VecDeque<Message>,
    capacity: usize,
}

impl InboundQueue {
    /// Create a queue. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append a message, returning the evicted one if the queue was full.
    pub fn push(&mut self, message: Message) -> Option<Message> {
        let evicted = if self.messages.len() >= self.capacity {
            self.messages.pop_front()
        } else {
            None
        };
        self.messages.push_back(message);
        evicted
    }

    /// Remove and return the oldest message.
    pub fn pop(&mut self) -> Option<Message> {
        self.messages.pop_front()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate oldest to newest without consuming.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }
}

// ============================================================================
// Filters
// ============================================================================

/// Invalid filter shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("Filter must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Exact key/value subset filter.
///
/// A message matches when every filter key is present in the message with an
/// equal value. Extra message keys are ignored; an empty filter matches
/// everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(Map<String, Value>);

impl Filter {
    /// Filter that accepts every message.
    pub fn all() -> Self {
        Self(Map::new())
    }

    /// Build a filter from a JSON value. `null` means "match all".
    pub fn from_value(value: Value) -> Result<Self, FilterError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::all()),
            other => Err(FilterError::NotAnObject(json_kind(&other))),
        }
    }

    /// Add a required key/value pair.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, message: &Message) -> bool {
        self.0.iter().all(|(key, expected)| {
            message
                .get(key)
                .is_some_and(|actual| values_equal(expected, actual))
        })
    }
}

impl TryFrom<Value> for Filter {
    type Error = FilterError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<Map<String, Value>> for Filter {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// JSON equality where `1` and `1.0` compare equal.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return x == y;
            }
            if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                return x == y;
            }
            match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        _ => a == b,
    }
}

// ============================================================================
// Subscribers
// ============================================================================

struct Subscriber {
    filter: Filter,
    callback: RxCallback,
}

/// Ordered list of `(filter, callback)` registrations.
///
/// There is no unregistration; subscribers live as long as the gateway.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: Vec<Subscriber>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    /// Append a registration; it is tested after all earlier ones.
    pub fn register(&mut self, filter: Filter, callback: RxCallback) {
        self.subscribers.push(Subscriber { filter, callback });
    }

    /// Callbacks whose filter matches `message`, in registration order.
    pub fn matching(&self, message: &Message) -> Vec<RxCallback> {
        self.subscribers
            .iter()
            .filter(|s| s.filter.matches(message))
            .map(|s| s.callback.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Outcome of delivering one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Callbacks that ran to completion.
    pub delivered: usize,
    /// Callbacks that panicked.
    pub panicked: usize,
}

/// Invoke `callbacks` in order with panic isolation.
///
/// A panicking callback is counted and logged; the remaining callbacks still
/// run.
pub fn deliver(callbacks: &[RxCallback], message: &Message) -> DispatchReport {
    let mut report = DispatchReport::default();

    for (index, callback) in callbacks.iter().enumerate() {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            callback(message);
        }));

        match result {
            Ok(()) => report.delivered += 1,
            Err(_) => {
                report.panicked += 1;
                tracing::error!(
                    "Subscriber #{} panicked while handling {}",
                    index,
                    message
                );
            }
        }
    }

    report
}
