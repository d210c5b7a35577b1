// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Hipbot Contributors

//! Identities and messages handed to the host pipeline.

use xmpp_parsers::jid::BareJid;

/// A resolved chat user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    /// Reply-capable address. `None` for ephemeral identities.
    pub id: Option<BareJid>,
    /// Display name
    pub name: String,
    /// Short alias users type to address this user (without the leading `@`)
    pub mention_name: Option<String>,
}

impl UserIdentity {
    /// Identity backed by a real address.
    pub fn new(id: BareJid, name: impl Into<String>, mention_name: Option<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
            mention_name,
        }
    }

    /// Placeholder for a room participant that could not be matched to the
    /// roster. It cannot be replied to directly.
    pub fn ephemeral(nickname: impl Into<String>) -> Self {
        Self {
            id: None,
            name: nickname.into(),
            mention_name: None,
        }
    }

    /// Whether a private reply can be sent to this user.
    pub fn is_reachable(&self) -> bool {
        self.id.is_some()
    }

    /// Text that mentions this user in a room: `@alias` when an alias is
    /// known, the display name otherwise.
    pub fn mention(&self) -> String {
        match &self.mention_name {
            Some(alias) => format!("@{alias}"),
            None => self.name.clone(),
        }
    }
}

/// Where an inbound message came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub user: UserIdentity,
    /// Bare room address; `None` for one-to-one messages.
    pub room: Option<BareJid>,
}

impl Source {
    pub fn private(user: UserIdentity) -> Self {
        Self { user, room: None }
    }

    pub fn room(user: UserIdentity, room: BareJid) -> Self {
        Self {
            user,
            room: Some(room),
        }
    }

    pub fn is_private(&self) -> bool {
        self.room.is_none()
    }
}

/// A message delivered to the host pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub body: String,
    pub source: Source,
    /// Set when the message is implicitly addressed to the bot.
    pub command: bool,
}

impl InboundMessage {
    pub fn new(body: impl Into<String>, source: Source) -> Self {
        Self {
            body: body.into(),
            source,
            command: false,
        }
    }

    /// Mark the message as addressed to the bot.
    pub fn into_command(mut self) -> Self {
        self.command = true;
        self
    }
}
