// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Hipbot Contributors

//! XMPP group-chat connector for chat-bot hosts.
//!
//! A [`Connector`] maintains one authenticated session, joins rooms and sends
//! messages; inbound stanzas are resolved against the roster by the
//! [`Callback`] and delivered to a host implementing [`Robot`]. The
//! [`Adapter`] wraps both into a run loop.

pub mod adapter;
pub mod address;
pub mod callback;
pub mod config;
pub mod connector;
pub mod error;
pub mod event;
pub mod identity;
pub mod robot;
pub mod roster;
pub mod stanza;
pub mod text;
pub mod transport;

pub use adapter::Adapter;
pub use address::{normalize_bare, normalize_jid, room_id, room_key};
pub use callback::{resolve, Callback};
pub use config::{ConnectorConfig, RoomSelection, UnknownUserPolicy};
pub use connector::{ConnectionState, Connector, RoomState};
pub use error::{ConnectorError, Result};
pub use event::{InboundEvent, MessageKind};
pub use identity::{InboundMessage, Source, UserIdentity};
pub use robot::{LifecycleEvent, Robot};
pub use roster::{Roster, RosterEntry};
pub use transport::{MemoryPeer, MemoryTransport, TokioXmppTransport, TransportEvent, XmppTransport};
pub use xmpp_parsers::jid::{BareJid, FullJid, Jid};
