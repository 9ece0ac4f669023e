// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Routing of received messages.
//!
//! Pure decision step: the receive loop applies the returned [`Inbound`]
//! (reply, directory update, enqueue) itself.

use crate::message::{Command, Message, CMD_HUBID};

/// What to do with one received message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Device is looking for the gateway: unicast `reply` back to the sender
    /// and learn `client` (if it carried one).
    FindHub {
        client: Option<String>,
        reply: Message,
    },

    /// Device announced itself: learn `client`, no reply. `None` when the
    /// announcement carried no usable client.
    Identify { client: Option<String> },

    /// Nothing to do.
    Ignored { reason: &'static str },

    /// Application traffic for the inbound queue.
    Application(Message),
}

/// Classify a received message by its `cmd`.
pub fn classify(message: Message) -> Inbound {
    match message.command() {
        Command::FindHub => {
            let client = message.client().map(str::to_string);
            let mut reply = message;
            reply.set_cmd(CMD_HUBID);
            Inbound::FindHub { client, reply }
        }
        Command::ClientId => Inbound::Identify {
            client: message.client().map(str::to_string),
        },
        Command::FindClient => Inbound::Ignored {
            reason: "findclient is gateway-originated",
        },
        Command::HubId | Command::Application(_) | Command::Missing => {
            Inbound::Application(message)
        }
    }
}
