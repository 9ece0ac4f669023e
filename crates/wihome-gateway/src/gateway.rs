// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway core: shared state, the three service loops and the consumer API.
//!
//! # Loops
//!
//! - **receive**: waits on the socket, answers `findhub`, learns device
//!   addresses and queues application traffic.
//! - **dispatch**: every poll interval pops one inbound message and hands it
//!   to each subscriber whose filter matches.
//! - **resolve**: every poll interval sends queued outbound messages whose
//!   client address is known, and broadcasts throttled `findclient` requests
//!   for the others.
//!
//! All shared tables sit behind their own mutex. Locks are never held across
//! an `.await`, and the lock order is outbound -> directory -> throttle.

use crate::classify::{classify, Inbound};
use crate::config::{ConfigError, GatewayConfig};
use crate::directory::DeviceDirectory;
use crate::discovery::DiscoveryThrottle;
use crate::inbound::{deliver, DispatchReport, Filter, InboundQueue, RxCallback, SubscriberRegistry};
use crate::message::Message;
use crate::outbound::{OutboundQueue, ResolvePlan};
use crate::stats::{GatewayStats, StatsSnapshot};
use crate::transport::{Transport, TransportError};
use parking_lot::Mutex;
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Gateway errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Gateway already running")]
    AlreadyRunning,

    #[error("Message has no client: {0}")]
    MissingClient(Message),
}

/// WiHome device-bus gateway.
///
/// Cheap to clone; all clones share the same socket, queues and tables.
#[derive(Clone)]
pub struct Gateway {
    config: Arc<GatewayConfig>,
    transport: Arc<Transport>,
    directory: Arc<Mutex<DeviceDirectory>>,
    throttle: Arc<Mutex<DiscoveryThrottle>>,
    inbound: Arc<Mutex<InboundQueue>>,
    outbound: Arc<Mutex<OutboundQueue>>,
    subscribers: Arc<Mutex<SubscriberRegistry>>,
    stats: Arc<GatewayStats>,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Gateway {
    /// Validate `config` and bind the device-bus socket.
    ///
    /// The loops are not started; see [`Gateway::start`] and [`Gateway::run`].
    pub async fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;

        let transport = Transport::bind(
            config.bind_socket_addr(),
            config.broadcast_socket_addr(),
            config.max_datagram_size,
        )?;

        Ok(Self {
            directory: Arc::new(Mutex::new(DeviceDirectory::new())),
            throttle: Arc::new(Mutex::new(DiscoveryThrottle::new(config.discovery_delay()))),
            inbound: Arc::new(Mutex::new(InboundQueue::new(config.inbound_capacity))),
            outbound: Arc::new(Mutex::new(OutboundQueue::new())),
            subscribers: Arc::new(Mutex::new(SubscriberRegistry::new())),
            stats: Arc::new(GatewayStats::default()),
            shutdown: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
            tasks: Arc::new(Mutex::new(Vec::new())),
            transport: Arc::new(transport),
            config: Arc::new(config),
        })
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Spawn the receive, dispatch and resolve loops on the current runtime.
    pub fn start(&self) -> Result<(), GatewayError> {
        let local_addr = self.local_addr()?;
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(GatewayError::AlreadyRunning);
        }

        let handles = vec![
            tokio::spawn(self.clone().receive_loop()),
            tokio::spawn(self.clone().dispatch_loop()),
            tokio::spawn(self.clone().resolve_loop()),
        ];
        self.tasks.lock().extend(handles);

        info!(
            "Gateway listening on {} (broadcast {})",
            local_addr,
            self.transport.broadcast_addr()
        );
        Ok(())
    }

    /// Start the loops and wait until [`Gateway::shutdown`] stops them.
    pub async fn run(&self) -> Result<(), GatewayError> {
        self.start()?;

        let handles: Vec<_> = self.tasks.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Gateway task failed: {}", e);
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Gateway stopped");
        Ok(())
    }

    /// Signal all loops to stop. Queued outbound messages are not drained.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    /// Check if the loops are running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------------
    // Consumer API
    // ------------------------------------------------------------------------

    /// Queue `message` for delivery to its `client`.
    ///
    /// Returns `false` (and queues nothing) when the message has no non-empty
    /// string `client`.
    pub fn write(&self, message: Message) -> bool {
        self.try_write(message).is_ok()
    }

    /// Like [`Gateway::write`], returning the rejected message on failure.
    pub fn try_write(&self, message: Message) -> Result<(), GatewayError> {
        if message.client().is_none() {
            GatewayStats::incr(&self.stats.rejected_writes);
            debug!("Rejecting outbound message without client: {}", message);
            return Err(GatewayError::MissingClient(message));
        }

        trace!("Queued outbound {}", message);
        self.outbound.lock().push(message);
        Ok(())
    }

    /// Whether an inbound message is waiting.
    pub fn isrx(&self) -> bool {
        !self.inbound.lock().is_empty()
    }

    /// Pop the oldest inbound message, if any. Never blocks.
    pub fn read(&self) -> Option<Message> {
        self.inbound.lock().pop()
    }

    /// Register `callback` for inbound messages matching `filter`.
    ///
    /// `filter` must be a JSON object (`null` matches everything). Any other
    /// shape is reported with a warning and the registration is skipped.
    pub fn attach_rx_event_callback<F>(&self, callback: F, filter: Value)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        match Filter::from_value(filter) {
            Ok(filter) => self.subscribe(filter, Arc::new(callback)),
            Err(e) => warn!("Skipping rx callback registration: {}", e),
        }
    }

    /// Register an already-built filter/callback pair.
    pub fn subscribe(&self, filter: Filter, callback: RxCallback) {
        let mut subscribers = self.subscribers.lock();
        subscribers.register(filter, callback);
        debug!("Registered rx subscriber #{}", subscribers.len());
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// Last known IP address of `client`.
    pub fn device_address(&self, client: &str) -> Option<IpAddr> {
        self.directory.lock().lookup(client)
    }

    /// Every known device with its IP address, sorted by client.
    pub fn devices(&self) -> Vec<(String, IpAddr)> {
        let mut devices: Vec<_> = self
            .directory
            .lock()
            .iter()
            .map(|(client, ip)| (client.clone(), *ip))
            .collect();
        devices.sort_unstable();
        devices
    }

    /// Number of known devices.
    pub fn device_count(&self) -> usize {
        self.directory.lock().len()
    }

    /// Number of outbound messages still waiting for resolution.
    pub fn pending_outbound(&self) -> usize {
        self.outbound.lock().len()
    }

    /// Number of inbound messages waiting for dispatch or `read`.
    pub fn inbound_len(&self) -> usize {
        self.inbound.lock().len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Address the device-bus socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, GatewayError> {
        Ok(self.transport.local_addr()?)
    }

    // ------------------------------------------------------------------------
    // Single passes (also used by the loops)
    // ------------------------------------------------------------------------

    /// Apply one received message.
    pub async fn handle_received(&self, message: Message, from: SocketAddr) {
        debug!("Received {} from {}", message, from);

        match classify(message) {
            Inbound::FindHub { client, reply } => {
                match self.transport.send(&reply, Some(from)).await {
                    Ok(_) => {
                        GatewayStats::incr(&self.stats.hub_replies);
                        debug!("Answered findhub from {}", from);
                    }
                    Err(e) => {
                        GatewayStats::incr(&self.stats.send_errors);
                        warn!("Failed to answer findhub from {}: {}", from, e);
                    }
                }
                match client {
                    Some(client) => self.learn(&client, from),
                    None => warn!("findhub from {} carries no client, not recorded", from),
                }
            }
            Inbound::Identify { client: Some(client) } => {
                GatewayStats::incr(&self.stats.identifications);
                self.learn(&client, from);
            }
            Inbound::Identify { client: None } => {
                warn!("clientid from {} carries no client, not recorded", from);
            }
            Inbound::Ignored { reason } => {
                debug!("Ignoring datagram from {}: {}", from, reason);
            }
            Inbound::Application(message) => {
                if let Some(evicted) = self.inbound.lock().push(message) {
                    GatewayStats::incr(&self.stats.inbound_dropped);
                    trace!("Inbound queue full, dropped {}", evicted);
                }
            }
        }
    }

    /// Record the sender's host; the source port is not where the device listens.
    fn learn(&self, client: &str, from: SocketAddr) {
        let ip = from.ip();
        let previous = self.directory.lock().record(client, ip);
        match previous {
            Some(old) => info!("Device {} moved {} -> {}", client, old, ip),
            None => debug!("Device {} at {} (seen from {})", client, ip, from),
        }
    }

    /// Pop one inbound message and run the matching subscribers.
    ///
    /// Returns `None` when the queue was empty.
    pub fn dispatch_once(&self) -> Option<DispatchReport> {
        let message = self.inbound.lock().pop()?;
        // callbacks run without any gateway lock held so they may call back in
        let callbacks = self.subscribers.lock().matching(&message);

        let report = deliver(&callbacks, &message);
        GatewayStats::incr(&self.stats.messages_dispatched);
        GatewayStats::add(&self.stats.callback_panics, report.panicked as u64);
        if callbacks.is_empty() {
            trace!("No subscriber for {}", message);
        }
        Some(report)
    }

    /// Run one resolver pass and perform the resulting sends.
    pub async fn resolve_once(&self) -> ResolvePlan {
        let plan = {
            let mut outbound = self.outbound.lock();
            let directory = self.directory.lock();
            let mut throttle = self.throttle.lock();
            outbound.resolve(
                &directory,
                &mut throttle,
                self.config.device_port,
                Instant::now(),
            )
        };

        for (message, addr) in &plan.deliveries {
            match self.transport.send(message, Some(*addr)).await {
                Ok(_) => {
                    GatewayStats::incr(&self.stats.messages_sent);
                    debug!("Sent {} to {}", message, addr);
                }
                Err(e) => {
                    GatewayStats::incr(&self.stats.send_errors);
                    warn!("Failed to send to {}: {}", addr, e);
                }
            }
        }

        for client in &plan.discoveries {
            match self.transport.send(&Message::findclient(client), None).await {
                Ok(target) => {
                    GatewayStats::incr(&self.stats.discovery_broadcasts);
                    debug!("Broadcast findclient for {} to {}", client, target);
                }
                Err(e) => {
                    GatewayStats::incr(&self.stats.send_errors);
                    warn!("Failed to broadcast findclient for {}: {}", client, e);
                }
            }
        }

        plan
    }

    // ------------------------------------------------------------------------
    // Loops
    // ------------------------------------------------------------------------

    async fn receive_loop(self) {
        let shutdown = self.shutdown.clone();
        let notified = shutdown.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        while self.is_running() {
            tokio::select! {
                result = self.transport.receive() => match result {
                    Ok((message, from)) => {
                        GatewayStats::incr(&self.stats.datagrams_received);
                        self.handle_received(message, from).await;
                    }
                    Err(e) if e.is_recoverable() => {
                        GatewayStats::incr(&self.stats.datagrams_received);
                        GatewayStats::incr(&self.stats.malformed_datagrams);
                        warn!("Discarding datagram: {}", e);
                    }
                    Err(e) => {
                        error!("Receive error: {}", e);
                        tokio::time::sleep(self.config.poll_interval()).await;
                    }
                },
                _ = &mut notified => break,
            }
        }
        debug!("Receive loop shutting down");
    }

    async fn dispatch_loop(self) {
        let shutdown = self.shutdown.clone();
        let notified = shutdown.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let interval = self.config.poll_interval();
        while self.is_running() {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.dispatch_once();
                }
                _ = &mut notified => break,
            }
        }
        debug!("Dispatch loop shutting down");
    }

    async fn resolve_loop(self) {
        let shutdown = self.shutdown.clone();
        let notified = shutdown.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let interval = self.config.poll_interval();
        while self.is_running() {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.resolve_once().await;
                }
                _ = &mut notified => break,
            }
        }
        debug!("Resolve loop shutting down");
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("local_addr", &self.transport.local_addr().ok())
            .field("running", &self.is_running())
            .finish()
    }
}
