// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Hipbot Contributors

//! Identity resolution and dispatch into the host pipeline.
//!
//! [`resolve`] is a pure function of an event and the roster snapshot; the
//! [`Callback`] applies roster updates and forwards whatever `resolve`
//! produces to the [`Robot`].

use std::sync::Arc;

use tracing::debug;
use xmpp_parsers::jid::{BareJid, Jid};

use crate::config::UnknownUserPolicy;
use crate::event::{InboundEvent, MessageKind};
use crate::identity::{InboundMessage, Source, UserIdentity};
use crate::robot::Robot;
use crate::roster::{fallback_name, Roster};

/// Resolve an inbound event into zero or one delivery.
///
/// Roster updates never produce a delivery; see [`Callback::dispatch`].
pub fn resolve(
    event: InboundEvent,
    roster: &Roster,
    policy: UnknownUserPolicy,
) -> Option<InboundMessage> {
    match event {
        InboundEvent::PrivateMessage { from, kind, body } => {
            resolve_private(&from, kind, body, roster)
        }
        InboundEvent::RoomMessage { room, nick, body } => {
            resolve_room(room, &nick, body, roster, policy)
        }
        InboundEvent::OccupantMessage {
            room,
            nick,
            kind,
            body,
        } => resolve_occupant(&room, &nick, kind, body, roster, policy),
        InboundEvent::RosterUpdate(_) => None,
    }
}

fn resolve_private(
    from: &Jid,
    kind: MessageKind,
    body: Option<String>,
    roster: &Roster,
) -> Option<InboundMessage> {
    if kind == MessageKind::Error {
        debug!("Dropping error message from {}", from);
        return None;
    }
    let body = body.filter(|b| !b.is_empty())?;

    let user = user_by_jid(&from.to_bare(), roster);
    debug!(
        user = %from.to_bare(),
        name = %user.name,
        "Dispatching private message"
    );
    Some(InboundMessage::new(body, Source::private(user)).into_command())
}

fn resolve_room(
    room: BareJid,
    nick: &str,
    body: String,
    roster: &Roster,
    policy: UnknownUserPolicy,
) -> Option<InboundMessage> {
    if body.is_empty() {
        return None;
    }

    let user = user_by_nick(nick, &room, roster, policy)?;
    match &user.id {
        Some(id) => debug!(user = %id, room = %room, "Dispatching room message"),
        None => debug!(nick = %nick, room = %room, "Dispatching room message from unknown user"),
    }
    Some(InboundMessage::new(body, Source::room(user, room)))
}

/// A one-to-one message relayed by a room. The occupant address is not the
/// sender's account, so the sender is matched by nickname like in the room.
fn resolve_occupant(
    room: &BareJid,
    nick: &str,
    kind: MessageKind,
    body: Option<String>,
    roster: &Roster,
    policy: UnknownUserPolicy,
) -> Option<InboundMessage> {
    if kind == MessageKind::Error {
        debug!("Dropping error message from {}/{}", room, nick);
        return None;
    }
    let body = body.filter(|b| !b.is_empty())?;

    let user = user_by_nick(nick, room, roster, policy)?;
    debug!(nick = %nick, room = %room, "Dispatching private message from room occupant");
    Some(InboundMessage::new(body, Source::private(user)).into_command())
}

fn user_by_nick(
    nick: &str,
    room: &BareJid,
    roster: &Roster,
    policy: UnknownUserPolicy,
) -> Option<UserIdentity> {
    match roster.find_by_name(nick) {
        Some(entry) => Some(entry.identity()),
        None => match policy {
            UnknownUserPolicy::Drop => {
                debug!(nick = %nick, room = %room, "Dropping message from unknown user");
                None
            }
            UnknownUserPolicy::Synthesize => Some(UserIdentity::ephemeral(nick)),
        },
    }
}

fn user_by_jid(jid: &BareJid, roster: &Roster) -> UserIdentity {
    debug!("Looking up user with JID: {}", jid);
    match roster.get(jid) {
        Some(entry) => entry.identity(),
        None => UserIdentity::new(jid.clone(), fallback_name(jid), None),
    }
}

/// Forwards resolved events to the host.
#[derive(Clone)]
pub struct Callback {
    robot: Arc<dyn Robot>,
    policy: UnknownUserPolicy,
}

impl Callback {
    pub fn new(robot: Arc<dyn Robot>, policy: UnknownUserPolicy) -> Self {
        Self { robot, policy }
    }

    /// Handle one inbound event. Roster updates are applied to `roster`;
    /// messages are resolved and delivered.
    pub fn dispatch(&self, event: InboundEvent, roster: &mut Roster) {
        if let InboundEvent::RosterUpdate(entries) = event {
            for entry in entries {
                debug!(user = %entry.jid, "Updating roster entry");
                roster.upsert(entry);
            }
            return;
        }

        if let Some(message) = resolve(event, roster, self.policy) {
            self.robot.receive(message);
        }
    }
}
