// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WiHome Gateway
//!
//! Standalone device-bus gateway. Answers device discovery, keeps the device
//! directory and logs every application message received from the bus.
//!
//! # Usage
//!
//! ```bash
//! # Start on the default port (24559)
//! wihome-gateway
//!
//! # Only log relay reports of one device
//! wihome-gateway --watch '{"client":"wihomeDEV2","cmd":"info","parameter":"relay"}'
//!
//! # Switch a relay on once the device has been found
//! wihome-gateway --send '{"client":"wihomeDEV2","cmd":"set","parameter":"relay","channel":0,"value":1}'
//!
//! # Use a config file
//! wihome-gateway --config gateway.json
//! ```

use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use wihome_gateway::{Filter, Gateway, GatewayConfig, Message, WIHOME_PORT};

/// WiHome Gateway - bridge WiHome UDP devices to an accessory bridge
#[derive(Parser, Debug)]
#[command(name = "wihome-gateway")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// UDP port to bind
    #[arg(short, long, default_value_t = WIHOME_PORT)]
    port: u16,

    /// Bind address (0.0.0.0 for all interfaces)
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Broadcast address for device discovery
    #[arg(long, default_value = "255.255.255.255")]
    broadcast: IpAddr,

    /// UDP port devices listen on
    #[arg(long, default_value_t = WIHOME_PORT)]
    device_port: u16,

    /// Configuration file (JSON format); overrides the network flags
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum queued inbound messages
    #[arg(long, default_value = "256")]
    capacity: usize,

    /// Poll interval of the dispatch and resolve loops (milliseconds)
    #[arg(long, default_value = "10")]
    poll_interval_ms: u64,

    /// Minimum delay between findclient broadcasts per device (milliseconds)
    #[arg(long, default_value = "3000")]
    discovery_delay_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// JSON message to send at start-up (repeatable)
    #[arg(long = "send", value_name = "JSON")]
    send: Vec<String>,

    /// JSON filter selecting which received messages are logged
    #[arg(long, value_name = "JSON")]
    watch: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Load or create config
    let config = if let Some(config_path) = &args.config {
        info!("Loading config from {:?}", config_path);
        GatewayConfig::from_file(config_path)?
    } else {
        GatewayConfig {
            bind_address: args.bind,
            port: args.port,
            broadcast_address: args.broadcast,
            device_port: args.device_port,
            inbound_capacity: args.capacity,
            poll_interval_ms: args.poll_interval_ms,
            discovery_delay_ms: args.discovery_delay_ms,
            ..Default::default()
        }
    };

    let watch = match &args.watch {
        Some(raw) => Filter::from_value(serde_json::from_str(raw)?)?,
        None => Filter::all(),
    };
    let mut outgoing = Vec::with_capacity(args.send.len());
    for raw in &args.send {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        outgoing.push(Message::try_from(value)?);
    }

    info!("+----------------------------------------------------+");
    info!(
        "|       WiHome Gateway v{}                       |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Bind:      {:38} |", config.bind_socket_addr());
    info!("|  Broadcast: {:38} |", config.broadcast_socket_addr());
    info!("|  Devices:   {:38} |", format!("port {}", config.device_port));
    info!("|  Queue:     {:38} |", config.inbound_capacity);
    info!(
        "|  Discovery: {:38} |",
        format!("every {}ms per device", config.discovery_delay_ms)
    );
    info!("+----------------------------------------------------+");

    let gateway = Gateway::new(config).await?;

    gateway.subscribe(
        watch,
        std::sync::Arc::new(|msg: &Message| {
            info!("RX {}", msg);
        }),
    );

    for msg in outgoing {
        if !gateway.write(msg) {
            warn!("--send message needs a \"client\" field, skipped");
        }
    }

    // Handle shutdown signals
    let gateway_handle = gateway.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping gateway...");
        gateway_handle.shutdown();
    });

    gateway.run().await?;

    let stats = gateway.stats();
    info!(
        "Gateway stopped: {} devices known, {} received, {} sent, {} discovery broadcasts, {} still pending",
        gateway.device_count(),
        stats.datagrams_received,
        stats.messages_sent,
        stats.discovery_broadcasts,
        gateway.pending_outbound()
    );
    for (client, ip) in gateway.devices() {
        info!("  {} at {}", client, ip);
    }
    Ok(())
}
