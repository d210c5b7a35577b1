// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Hipbot Contributors

//! The host pipeline boundary.

use crate::identity::InboundMessage;

/// Lifecycle notifications sent to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Connected,
    Disconnected,
    Joined { room: String },
    Parted { room: String },
    /// The session failed underneath us; the host should shut down.
    ShutdownRequested { reason: String },
}

/// The chat-bot host the connector delivers into.
///
/// Callbacks run on the session driver task and must not block.
pub trait Robot: Send + Sync + 'static {
    /// Receive a resolved inbound message. The host owns it from here on.
    fn receive(&self, message: InboundMessage);

    /// Observe a lifecycle transition.
    fn trigger(&self, event: LifecycleEvent);

    /// The bot's own alias, as published in its roster entry.
    fn set_mention_name(&self, _mention_name: &str) {}

    /// Rooms the host remembers joining in earlier runs.
    fn persisted_rooms(&self) -> Vec<String> {
        Vec::new()
    }

    /// Room ids the MUC service advertised at startup.
    fn rooms_discovered(&self, _rooms: &[String]) {}
}
