// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Hipbot Contributors

//! Stanza dispatch and builders.
//!
//! Inbound `minidom::Element`s are classified into [`Incoming`] values for the
//! session driver; outbound stanzas are built here so the connector never
//! touches raw XML.

use minidom::Element;
use tracing::{debug, warn};
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::jid::{BareJid, FullJid, Jid};
use xmpp_parsers::message::{Body, Message, MessageType, Subject};
use xmpp_parsers::muc::user::{MucUser, Status};
use xmpp_parsers::ns;
use xmpp_parsers::presence::{Presence, Show, Type as PresenceType};
use xmpp_parsers::roster::Roster;

use crate::event::{InboundEvent, MessageKind};
use crate::roster::parse_roster_query;

/// Service Discovery items namespace (XEP-0030).
pub const DISCO_ITEMS_NS: &str = "http://jabber.org/protocol/disco#items";

/// XMPP Ping namespace (XEP-0199).
pub const PING_NS: &str = "urn:xmpp:ping";

const CLIENT_NS: &str = "jabber:client";

/// What a MUC presence says about our own occupant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomPresence {
    /// Self-presence (status 110): the join completed.
    Joined,
    /// Unavailable self-presence: we left or were removed.
    Left,
    /// The room rejected our presence.
    Error(String),
}

/// A classified inbound stanza.
#[derive(Debug, Clone)]
pub enum Incoming {
    /// A message or roster push for the host pipeline.
    Event(InboundEvent),
    /// Roster push that must be acknowledged with `id`.
    RosterPush {
        id: String,
        from: Option<Jid>,
        event: InboundEvent,
    },
    /// Response to one of our IQ requests.
    IqResponse {
        id: String,
        from: Option<Jid>,
        result: Result<Option<Element>, String>,
    },
    /// XEP-0199 ping that must be answered.
    Ping { id: String, from: Option<Jid> },
    /// Presence about our own occupant in a room.
    Room { room: BareJid, presence: RoomPresence },
    /// Nothing to do.
    Ignored,
}

/// Classify a raw stanza.
pub fn dispatch_stanza(elem: Element) -> Incoming {
    if elem.is("message", CLIENT_NS) {
        match Message::try_from(elem) {
            Ok(msg) => dispatch_message(msg),
            Err(e) => {
                warn!("Failed to parse message stanza: {e}");
                Incoming::Ignored
            }
        }
    } else if elem.is("presence", CLIENT_NS) {
        match Presence::try_from(elem) {
            Ok(pres) => dispatch_presence(pres),
            Err(e) => {
                warn!("Failed to parse presence stanza: {e}");
                Incoming::Ignored
            }
        }
    } else if elem.is("iq", CLIENT_NS) {
        match Iq::try_from(elem) {
            Ok(iq) => dispatch_iq(iq),
            Err(e) => {
                warn!("Failed to parse IQ stanza: {e}");
                Incoming::Ignored
            }
        }
    } else {
        debug!("Ignoring unknown stanza: {}", elem.name());
        Incoming::Ignored
    }
}

fn dispatch_message(msg: Message) -> Incoming {
    let from = match msg.from.clone() {
        Some(from) => from,
        None => return Incoming::Ignored,
    };
    let body = msg
        .get_best_body(vec!["en", ""])
        .map(|(_lang, body)| body.0.clone());

    match msg.type_ {
        MessageType::Groupchat => {
            // Subject changes and service messages from the bare room
            // carry no sender nickname.
            let (Ok(occupant), Some(body)) = (from.clone().try_into_full(), body) else {
                debug!("Ignoring groupchat stanza without occupant body from {}", from);
                return Incoming::Ignored;
            };
            Incoming::Event(InboundEvent::RoomMessage {
                room: occupant.to_bare(),
                nick: occupant.resource().as_str().to_string(),
                body,
            })
        }
        other => Incoming::Event(InboundEvent::PrivateMessage {
            from,
            kind: MessageKind::from(other),
            body,
        }),
    }
}

fn dispatch_presence(pres: Presence) -> Incoming {
    let from = match pres.from.as_ref() {
        Some(f) => f.clone(),
        None => return Incoming::Ignored,
    };

    let muc_user = pres
        .payloads
        .iter()
        .find(|p| p.is("x", ns::MUC_USER))
        .and_then(|p| MucUser::try_from(p.clone()).ok());

    match (pres.type_, muc_user) {
        (PresenceType::Error, _) => Incoming::Room {
            room: from.to_bare(),
            presence: RoomPresence::Error(presence_error_text(&pres.payloads)),
        },
        (PresenceType::None, Some(mu)) if mu.status.iter().any(|s| *s == Status::SelfPresence) => {
            Incoming::Room {
                room: from.to_bare(),
                presence: RoomPresence::Joined,
            }
        }
        (PresenceType::Unavailable, Some(mu))
            if mu.status.iter().any(|s| *s == Status::SelfPresence) =>
        {
            Incoming::Room {
                room: from.to_bare(),
                presence: RoomPresence::Left,
            }
        }
        _ => Incoming::Ignored,
    }
}

fn presence_error_text(payloads: &[Element]) -> String {
    payloads
        .iter()
        .find(|p| p.name() == "error")
        .and_then(|error| error.children().next())
        .map(|condition| condition.name().to_string())
        .unwrap_or_else(|| "unknown error".to_string())
}

fn dispatch_iq(iq: Iq) -> Incoming {
    match iq.payload {
        IqType::Result(payload) => Incoming::IqResponse {
            id: iq.id,
            from: iq.from,
            result: Ok(payload),
        },
        IqType::Error(error) => Incoming::IqResponse {
            id: iq.id,
            from: iq.from,
            result: Err(format!("{:?}", error.defined_condition)),
        },
        IqType::Set(elem) if elem.is("query", ns::ROSTER) => Incoming::RosterPush {
            id: iq.id,
            from: iq.from,
            event: InboundEvent::RosterUpdate(parse_roster_query(&elem)),
        },
        IqType::Get(elem) if elem.is("ping", PING_NS) => Incoming::Ping {
            id: iq.id,
            from: iq.from,
        },
        _ => {
            debug!("Ignoring unhandled IQ {}", iq.id);
            Incoming::Ignored
        }
    }
}

/// Extract bare room addresses from a disco#items result payload.
pub fn parse_disco_items(payload: Option<&Element>) -> Vec<BareJid> {
    let Some(query) = payload.filter(|p| p.is("query", DISCO_ITEMS_NS)) else {
        return vec![];
    };

    query
        .children()
        .filter(|child| child.is("item", DISCO_ITEMS_NS))
        .filter_map(|item| item.attr("jid"))
        .filter_map(|jid| match jid.parse::<Jid>() {
            Ok(jid) => Some(jid.to_bare()),
            Err(e) => {
                warn!("Skipping disco item with invalid JID {}: {e}", jid);
                None
            }
        })
        .collect()
}

/// Build initial presence stanza for sending after connection.
pub fn build_initial_presence() -> Element {
    let mut pres = Presence::new(PresenceType::None);
    pres.show = Some(Show::Chat);
    pres.into()
}

/// Build a roster query IQ stanza.
pub fn build_roster_query(id: &str) -> Element {
    let roster = Roster {
        ver: None,
        items: vec![],
    };
    Iq::from_get(id, roster).into()
}

/// Build a disco#items query for the rooms hosted on `domain`.
pub fn build_disco_items_query(id: &str, domain: &str) -> Element {
    let query = Element::builder("query", DISCO_ITEMS_NS).build();
    Element::builder("iq", CLIENT_NS)
        .attr("type", "get")
        .attr("id", id)
        .attr("to", domain)
        .append(query)
        .build()
}

/// Build an empty IQ result acknowledging `id`.
pub fn build_iq_result(id: &str, to: Option<&Jid>) -> Element {
    let mut builder = Element::builder("iq", CLIENT_NS)
        .attr("type", "result")
        .attr("id", id);
    if let Some(jid) = to {
        builder = builder.attr("to", jid.to_string());
    }
    builder.build()
}

/// Build a MUC join presence stanza. Room history is not requested.
pub fn build_muc_join(occupant: &FullJid) -> Element {
    let history = Element::builder("history", ns::MUC)
        .attr("maxstanzas", "0")
        .build();
    let muc_elem = Element::builder("x", ns::MUC).append(history).build();

    let mut pres = Presence::new(PresenceType::None);
    pres.to = Some(Jid::from(occupant.clone()));
    pres.payloads = vec![muc_elem];
    pres.into()
}

/// Build a MUC leave presence stanza (unavailable presence to room).
pub fn build_muc_leave(occupant: &FullJid) -> Element {
    let mut pres = Presence::new(PresenceType::Unavailable);
    pres.to = Some(Jid::from(occupant.clone()));
    pres.into()
}

/// Build a chat message stanza.
pub fn build_chat_message(to: &Jid, body: &str) -> Element {
    let mut msg = Message::new(Some(to.clone()));
    msg.type_ = MessageType::Chat;
    msg.bodies.insert(String::new(), Body(body.to_string()));
    msg.into()
}

/// Build a groupchat message stanza.
pub fn build_room_message(room: &BareJid, body: &str) -> Element {
    let mut msg = Message::new(Some(Jid::from(room.clone())));
    msg.type_ = MessageType::Groupchat;
    msg.bodies.insert(String::new(), Body(body.to_string()));
    msg.into()
}

/// Build a groupchat subject change.
pub fn build_room_subject(room: &BareJid, subject: &str) -> Element {
    let mut msg = Message::new(Some(Jid::from(room.clone())));
    msg.type_ = MessageType::Groupchat;
    msg.subjects
        .insert(String::new(), Subject(subject.to_string()));
    msg.into()
}
