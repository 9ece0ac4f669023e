// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP transport for the device bus.
//!
//! One IPv4 socket, bound to the well-known port with `SO_BROADCAST` so the
//! gateway can reach devices whose address is not known yet. Sends and
//! receives may be interleaved from different tasks.

use crate::message::{Message, MessageError};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::UdpSocket;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed datagram from {from}: {reason}")]
    Malformed {
        from: SocketAddr,
        reason: MessageError,
    },

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TransportError {
    /// Whether the receive loop can simply drop the datagram and go on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

/// Broadcast-capable UDP endpoint carrying JSON messages.
#[derive(Debug)]
pub struct Transport {
    socket: UdpSocket,
    broadcast_addr: SocketAddr,
    max_datagram_size: usize,
}

impl Transport {
    /// Bind the device-bus socket.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(
        bind_addr: SocketAddr,
        broadcast_addr: SocketAddr,
        max_datagram_size: usize,
    ) -> Result<Self, TransportError> {
        let socket = socket2::Socket::new(
            socket2::Domain::IPV4,
            socket2::Type::DGRAM,
            Some(socket2::Protocol::UDP),
        )?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;
        socket.bind(&bind_addr.into())?;
        // tokio requires a non-blocking std socket
        socket.set_nonblocking(true)?;

        let socket = UdpSocket::from_std(socket.into())?;

        Ok(Self {
            socket,
            broadcast_addr,
            max_datagram_size,
        })
    }

    /// Address the socket is actually bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// Destination used when `send` is given no address.
    pub fn broadcast_addr(&self) -> SocketAddr {
        self.broadcast_addr
    }

    /// Send one message as a single datagram.
    ///
    /// `None` broadcasts. There is no delivery confirmation.
    pub async fn send(
        &self,
        message: &Message,
        addr: Option<SocketAddr>,
    ) -> Result<SocketAddr, TransportError> {
        let target = addr.unwrap_or(self.broadcast_addr);
        let payload = message.to_bytes()?;
        self.socket.send_to(&payload, target).await?;
        Ok(target)
    }

    /// Wait for one datagram and decode it.
    ///
    /// Payloads that are not a JSON object return
    /// [`TransportError::Malformed`]; the socket stays usable.
    pub async fn receive(&self) -> Result<(Message, SocketAddr), TransportError> {
        let mut buf = vec![0u8; self.max_datagram_size];
        let (len, from) = self.socket.recv_from(&mut buf).await?;

        match Message::from_bytes(&buf[..len]) {
            Ok(message) => Ok((message, from)),
            Err(reason) => Err(TransportError::Malformed { from, reason }),
        }
    }
}
