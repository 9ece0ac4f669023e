// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WiHome Device-Bus Gateway
//!
//! Bridges WiHome home-automation devices, which talk flat JSON over UDP, to
//! an accessory-bridge consumer (e.g. a HomeKit bridge).
//!
//! # Features
//!
//! - **Discovery**: answers device `findhub` broadcasts with `hubid`, learns
//!   device addresses from `findhub`/`clientid`, and broadcasts throttled
//!   `findclient` requests for unknown destinations
//! - **Inbound dispatch**: bounded FIFO of received application messages,
//!   delivered to subscribers by exact key/value filters
//! - **Outbound resolution**: messages are queued per `client` and sent as
//!   soon as the device address is known
//!
//! # Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use wihome_gateway::{Gateway, GatewayConfig, Message};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = Gateway::new(GatewayConfig::default()).await?;
//! gateway.start()?;
//!
//! gateway.attach_rx_event_callback(
//!     |msg: &Message| println!("relay state: {:?}", msg.get("value")),
//!     json!({"client": "wihomeDEV2", "cmd": "info", "parameter": "relay", "channel": 0}),
//! );
//!
//! let set = Message::try_from(json!({
//!     "client": "wihomeDEV2", "cmd": "set", "parameter": "relay", "channel": 0, "value": 1
//! }))?;
//! assert!(gateway.write(set));
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod directory;
pub mod discovery;
pub mod gateway;
pub mod inbound;
pub mod message;
pub mod outbound;
pub mod stats;
pub mod transport;

pub use config::{ConfigError, GatewayConfig, WIHOME_PORT};
pub use directory::DeviceDirectory;
pub use gateway::{Gateway, GatewayError};
pub use inbound::{DispatchReport, Filter, FilterError, RxCallback};
pub use message::{Command, Message, MessageError};
pub use outbound::ResolvePlan;
pub use stats::StatsSnapshot;
pub use transport::{Transport, TransportError};
