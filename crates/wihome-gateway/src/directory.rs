// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device directory: client identifier -> last observed IP address.
//!
//! Entries are learned only from `findhub` and `clientid` traffic. Only the
//! host part of the sender is kept; devices are addressed on the device-bus
//! port. A newer observation replaces the previous address; nothing expires.

use std::collections::HashMap;
use std::net::IpAddr;

/// Registry of known devices.
#[derive(Debug, Default)]
pub struct DeviceDirectory {
    devices: HashMap<String, IpAddr>,
}

impl DeviceDirectory {
    /// Create a new empty directory.
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
        }
    }

    /// Record `client` at `address`, replacing any previous entry.
    ///
    /// Returns the previous address when it differs from the new one.
    pub fn record(&mut self, client: &str, address: IpAddr) -> Option<IpAddr> {
        self.devices
            .insert(client.to_string(), address)
            .filter(|old| *old != address)
    }

    /// Current address of `client`, if known.
    pub fn lookup(&self, client: &str) -> Option<IpAddr> {
        self.devices.get(client).copied()
    }

    /// Number of known devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Iterate over all devices.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &IpAddr)> {
        self.devices.iter()
    }
}
