// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway configuration.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Well-known WiHome device-bus port.
pub const WIHOME_PORT: u16 = 24559;

/// Default inbound queue bound (most recent messages kept).
pub const DEFAULT_INBOUND_CAPACITY: usize = 256;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value: {0}")]
    Invalid(String),
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Address to bind to (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// UDP port to bind and to broadcast discovery on (default: 24559)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Destination for `findclient` broadcasts (default: 255.255.255.255)
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: IpAddr,

    /// Port for `findclient` broadcasts (default: same as `port`)
    #[serde(default)]
    pub broadcast_port: Option<u16>,

    /// Port devices listen on; outbound messages go to `<device ip>:device_port`
    #[serde(default = "default_port")]
    pub device_port: u16,

    /// Maximum number of queued inbound messages; oldest are dropped first
    #[serde(default = "default_inbound_capacity")]
    pub inbound_capacity: usize,

    /// Sleep between dispatcher and resolver passes (milliseconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Minimum delay between two `findclient` broadcasts for one client (milliseconds)
    #[serde(default = "default_discovery_delay")]
    pub discovery_delay_ms: u64,

    /// Receive buffer size (bytes)
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    WIHOME_PORT
}

fn default_broadcast_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::BROADCAST)
}

fn default_inbound_capacity() -> usize {
    DEFAULT_INBOUND_CAPACITY
}

fn default_poll_interval() -> u64 {
    10
}

fn default_discovery_delay() -> u64 {
    3000
}

fn default_max_datagram_size() -> usize {
    4096
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            broadcast_address: default_broadcast_address(),
            broadcast_port: None,
            device_port: default_port(),
            inbound_capacity: default_inbound_capacity(),
            poll_interval_ms: default_poll_interval(),
            discovery_delay_ms: default_discovery_delay(),
            max_datagram_size: default_max_datagram_size(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Socket address the gateway binds to.
    pub fn bind_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Socket address discovery broadcasts are sent to.
    ///
    /// Devices listen on the same well-known port as the gateway, so the
    /// bind port is reused unless `broadcast_port` overrides it. An ephemeral
    /// bind port (`0`) broadcasts on [`WIHOME_PORT`].
    pub fn broadcast_socket_addr(&self) -> SocketAddr {
        let port = match (self.broadcast_port, self.port) {
            (Some(port), _) => port,
            (None, 0) => WIHOME_PORT,
            (None, port) => port,
        };
        SocketAddr::new(self.broadcast_address, port)
    }

    /// Get poll interval as Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get discovery rate-limit delay as Duration.
    pub fn discovery_delay(&self) -> Duration {
        Duration::from_millis(self.discovery_delay_ms)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inbound_capacity == 0 {
            return Err(ConfigError::Invalid("inbound_capacity cannot be 0".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms cannot be 0".into()));
        }
        if self.device_port == 0 {
            return Err(ConfigError::Invalid("device_port cannot be 0".into()));
        }
        if self.max_datagram_size < 16 {
            return Err(ConfigError::Invalid(
                "max_datagram_size must be at least 16 bytes".into(),
            ));
        }
        if !self.bind_address.is_ipv4() || !self.broadcast_address.is_ipv4() {
            return Err(ConfigError::Invalid(
                "device bus is IPv4 only (bind_address, broadcast_address)".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.port, 24559);
        assert_eq!(config.inbound_capacity, 256);
        assert_eq!(config.device_port, WIHOME_PORT);
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
        assert_eq!(config.discovery_delay(), Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: GatewayConfig = serde_json::from_str(r#"{"port": 30000}"#).unwrap();
        assert_eq!(config.port, 30000);
        assert_eq!(config.inbound_capacity, DEFAULT_INBOUND_CAPACITY);
        assert_eq!(
            config.broadcast_socket_addr(),
            "255.255.255.255:30000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.json");
        let config = GatewayConfig {
            discovery_delay_ms: 500,
            ..Default::default()
        };
        config.to_file(&path).unwrap();

        let loaded = GatewayConfig::from_file(&path).unwrap();
        assert_eq!(loaded.discovery_delay_ms, 500);
        assert_eq!(loaded.port, config.port);
    }

    #[test]
    fn test_from_file_missing() {
        let err = GatewayConfig::from_file(Path::new("/nonexistent/gateway.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_validation_zero_capacity() {
        let config = GatewayConfig {
            inbound_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_ipv6_rejected() {
        let config = GatewayConfig {
            bind_address: "::".parse().unwrap(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ephemeral_port_broadcasts_on_wihome_port() {
        let config = GatewayConfig {
            port: 0,
            ..Default::default()
        };
        assert_eq!(config.broadcast_socket_addr().port(), WIHOME_PORT);
    }

    #[test]
    fn test_device_port_independent_of_bind_port() {
        let config: GatewayConfig = serde_json::from_str(r#"{"port": 0}"#).unwrap();
        assert_eq!(config.device_port, WIHOME_PORT);

        let config: GatewayConfig =
            serde_json::from_str(r#"{"port": 30000, "device_port": 24556}"#).unwrap();
        assert_eq!(config.port, 30000);
        assert_eq!(config.device_port, 24556);
    }

    #[test]
    fn test_validation_zero_device_port() {
        let config = GatewayConfig {
            device_port: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_broadcast_port_override() {
        let config = GatewayConfig {
            broadcast_address: "192.168.0.255".parse().unwrap(),
            broadcast_port: Some(24556),
            ..Default::default()
        };
        assert_eq!(
            config.broadcast_socket_addr(),
            "192.168.0.255:24556".parse::<SocketAddr>().unwrap()
        );
    }
}
