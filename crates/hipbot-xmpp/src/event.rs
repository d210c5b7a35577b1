// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Hipbot Contributors

//! Typed inbound events consumed by the callback.

use xmpp_parsers::jid::{BareJid, Jid};
use xmpp_parsers::message::MessageType;

use crate::roster::RosterEntry;

/// Message `type` attribute of a one-to-one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Chat,
    Normal,
    Headline,
    Groupchat,
    Error,
}

impl From<MessageType> for MessageKind {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Chat => MessageKind::Chat,
            MessageType::Normal => MessageKind::Normal,
            MessageType::Headline => MessageKind::Headline,
            MessageType::Groupchat => MessageKind::Groupchat,
            MessageType::Error => MessageKind::Error,
        }
    }
}

/// An inbound event from the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// One-to-one message, addressed by the sender's full JID.
    PrivateMessage {
        from: Jid,
        kind: MessageKind,
        body: Option<String>,
    },
    /// Room message, addressed by the sender's nickname.
    RoomMessage {
        room: BareJid,
        nick: String,
        body: String,
    },
    /// One-to-one message sent through a room, addressed by the sender's
    /// room nickname rather than a real address.
    OccupantMessage {
        room: BareJid,
        nick: String,
        kind: MessageKind,
        body: Option<String>,
    },
    /// Roster entries added or changed.
    RosterUpdate(Vec<RosterEntry>),
}
