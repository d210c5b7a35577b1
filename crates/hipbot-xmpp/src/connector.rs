// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Hipbot Contributors

//! Session lifecycle, room membership and outbound messaging.
//!
//! [`Connector::connect`] establishes the session and spawns a single
//! session driver task. The driver exclusively owns the transport, the roster
//! snapshot and the room membership map; [`Connector`] handles talk to it over
//! a command channel, so commands are applied in the order they were issued.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> ShuttingDown -> Disconnected
//! ```
//!
//! There is no reconnect: once the driver stops, every handle reports
//! [`ConnectorError::Closed`].

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use minidom::Element;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;
use xmpp_parsers::jid::{BareJid, FullJid, Jid};
use xmpp_parsers::ns;

use crate::address::{normalize_jid, room_key};
use crate::callback::Callback;
use crate::config::ConnectorConfig;
use crate::error::{ConnectorError, Result};
use crate::event::InboundEvent;
use crate::robot::{LifecycleEvent, Robot};
use crate::roster::{parse_roster_query, Roster};
use crate::stanza::{self, Incoming, RoomPresence};
use crate::text::encode_text;
use crate::transport::{TransportEvent, XmppTransport};

/// IQ id of the roster request sent during connect.
pub const ROSTER_QUERY_ID: &str = "roster-1";

/// Upper bound for the stream to come online.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const COMMAND_BUFFER: usize = 64;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    ShuttingDown,
}

/// Join progress of a room session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    /// Join presence sent, no self-presence yet.
    Joining,
    /// The room confirmed our occupant.
    Joined,
}

#[derive(Debug, Clone)]
struct RoomSession {
    occupant: FullJid,
    state: RoomState,
}

type Responder<T> = oneshot::Sender<T>;

enum Command {
    Join {
        domain: String,
        room: String,
        reply: Responder<Result<()>>,
    },
    Part {
        domain: String,
        room: String,
        reply: Responder<Result<()>>,
    },
    ListRooms {
        domain: String,
        reply: Responder<Result<Vec<BareJid>>>,
    },
    MessageJid {
        to: Jid,
        lines: Vec<String>,
        reply: Responder<Result<()>>,
    },
    MessageMuc {
        room: String,
        lines: Vec<String>,
        reply: Responder<Result<()>>,
    },
    SetTopic {
        room: String,
        topic: String,
        reply: Responder<Result<()>>,
    },
    JoinedRooms {
        reply: Responder<Vec<(BareJid, RoomState)>>,
    },
    ShutDown {
        reply: Responder<()>,
    },
}

enum PendingRequest {
    RoomList {
        domain: String,
        reply: Responder<Result<Vec<BareJid>>>,
    },
}

impl PendingRequest {
    fn is_abandoned(&self) -> bool {
        match self {
            PendingRequest::RoomList { reply, .. } => reply.is_closed(),
        }
    }

    /// Whether a response from `from` may answer this request.
    fn answered_by(&self, from: Option<&Jid>) -> bool {
        match self {
            PendingRequest::RoomList { domain, .. } => {
                from.is_some_and(|from| from.to_string().eq_ignore_ascii_case(domain))
            }
        }
    }
}

/// Handle to the XMPP session. Cheap to clone.
#[derive(Clone)]
pub struct Connector {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    jid: FullJid,
    config: Arc<ConnectorConfig>,
}

impl Connector {
    /// Open the session: wait for the authenticated stream, load the roster,
    /// bind inbound dispatch and send initial presence.
    ///
    /// Failures are not retried.
    pub async fn connect<T: XmppTransport>(
        config: ConnectorConfig,
        robot: Arc<dyn Robot>,
        transport: T,
    ) -> Result<Connector> {
        config.validate()?;
        let jid = config.own_jid()?;
        let config = Arc::new(config);

        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);

        let mut driver = SessionDriver {
            transport,
            commands: command_rx,
            state: state_tx,
            jid: jid.clone(),
            config: config.clone(),
            callback: Callback::new(robot.clone(), config.unknown_users),
            robot,
            roster: Roster::new(),
            rooms: HashMap::new(),
            leaving: HashMap::new(),
            pending: HashMap::new(),
            backlog: Vec::new(),
        };

        if let Err(e) = driver.establish().await {
            warn!("Failed to connect as {}: {e}", jid);
            driver.close().await;
            return Err(e);
        }
        tokio::spawn(driver.run());

        Ok(Connector {
            commands: command_tx,
            state: state_rx,
            jid,
            config,
        })
    }

    /// The bot's own full JID.
    pub fn jid(&self) -> &FullJid {
        &self.jid
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the session has ended, by shutdown or transport failure.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await;
    }

    /// Join `room` on `domain`. Joining a room already joined is a no-op.
    pub async fn join(&self, domain: &str, room: &str) -> Result<()> {
        self.request(|reply| Command::Join {
            domain: domain.to_string(),
            room: room.to_string(),
            reply,
        })
        .await?
    }

    /// Leave `room` on `domain`. Leaving a room not joined is a no-op.
    pub async fn part(&self, domain: &str, room: &str) -> Result<()> {
        self.request(|reply| Command::Part {
            domain: domain.to_string(),
            room: room.to_string(),
            reply,
        })
        .await?
    }

    /// Join each room in order. Joins are confirmed asynchronously.
    pub async fn join_rooms<I, S>(&self, domain: &str, rooms: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for room in rooms {
            self.join(domain, room.as_ref()).await?;
        }
        Ok(())
    }

    /// Ask the MUC service on `domain` for its rooms.
    pub async fn list_rooms(&self, domain: &str) -> Result<Vec<BareJid>> {
        debug!("Querying server for list of rooms.");
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::ListRooms {
                domain: domain.to_string(),
                reply,
            })
            .await
            .map_err(|_| ConnectorError::Closed)?;

        match timeout(self.config.request_timeout(), response).await {
            Ok(Ok(rooms)) => rooms,
            Ok(Err(_)) => Err(ConnectorError::Closed),
            Err(_) => Err(ConnectorError::Timeout("room list")),
        }
    }

    /// Send each line as its own one-to-one message, in order.
    pub async fn message_jid<I, S>(&self, address: &str, lines: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let to = Jid::from_str(address)
            .map_err(|e| ConnectorError::invalid_address(format!("{address}: {e}")))?;
        let lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        self.request(|reply| Command::MessageJid { to, lines, reply })
            .await?
    }

    /// Send each line to a joined room. Lines for rooms not joined are dropped.
    pub async fn message_muc<I, S>(&self, room: &str, lines: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        self.request(|reply| Command::MessageMuc {
            room: room.to_string(),
            lines,
            reply,
        })
        .await?
    }

    /// Set the subject of a joined room; no-op for rooms not joined.
    pub async fn set_topic(&self, room: &str, topic: &str) -> Result<()> {
        self.request(|reply| Command::SetTopic {
            room: room.to_string(),
            topic: topic.to_string(),
            reply,
        })
        .await?
    }

    /// Bare addresses of the rooms currently joined or being joined.
    pub async fn joined_rooms(&self) -> Result<Vec<BareJid>> {
        let rooms = self.room_states().await?;
        Ok(rooms.into_iter().map(|(jid, _)| jid).collect())
    }

    /// Membership with join progress, sorted by address.
    pub async fn room_states(&self) -> Result<Vec<(BareJid, RoomState)>> {
        self.request(|reply| Command::JoinedRooms { reply }).await
    }

    /// Close the session. Errors while closing are logged, never returned.
    pub async fn shut_down(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::ShutDown { reply }).await.is_err() {
            debug!("Session already closed");
            return;
        }
        let _ = done.await;
    }

    async fn request<T>(&self, command: impl FnOnce(Responder<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| ConnectorError::Closed)?;
        response.await.map_err(|_| ConnectorError::Closed)
    }
}

enum Step {
    Command(Option<Command>),
    Event(Option<TransportEvent>),
}

struct SessionDriver<T> {
    transport: T,
    commands: mpsc::Receiver<Command>,
    state: watch::Sender<ConnectionState>,
    jid: FullJid,
    config: Arc<ConnectorConfig>,
    callback: Callback,
    robot: Arc<dyn Robot>,
    roster: Roster,
    rooms: HashMap<BareJid, RoomSession>,
    /// Leave presences sent per room and not yet answered by the room.
    leaving: HashMap<BareJid, usize>,
    pending: HashMap<String, PendingRequest>,
    /// Stanzas received before the roster arrived.
    backlog: Vec<Element>,
}

impl<T: XmppTransport> SessionDriver<T> {
    fn set_state(&self, state: ConnectionState) {
        debug!("Connection state: {:?}", state);
        self.state.send_replace(state);
    }

    async fn establish(&mut self) -> Result<()> {
        self.set_state(ConnectionState::Connecting);
        info!("Connecting to {} as {}", self.config.server, self.jid);

        timeout(CONNECT_TIMEOUT, self.wait_online())
            .await
            .map_err(|_| ConnectorError::Timeout("connection"))??;

        debug!("Loading roster.");
        self.transport
            .send(stanza::build_roster_query(ROSTER_QUERY_ID))
            .await?;
        let roster = timeout(self.config.request_timeout(), self.wait_roster())
            .await
            .map_err(|_| ConnectorError::Timeout("roster"))??;
        if let Some(query) = roster {
            for entry in parse_roster_query(&query) {
                self.roster.upsert(entry);
            }
        }
        info!("Loaded roster with {} entries", self.roster.len());

        if let Some(mention_name) = self
            .roster
            .get(&self.jid.to_bare())
            .and_then(|entry| entry.mention_name.clone())
        {
            self.robot.set_mention_name(&mention_name);
        }

        debug!("Sending initial XMPP presence.");
        self.transport.send(stanza::build_initial_presence()).await?;
        self.set_state(ConnectionState::Connected);
        info!("Connected as {}", self.jid);

        for elem in std::mem::take(&mut self.backlog) {
            self.handle_stanza(elem).await;
        }
        Ok(())
    }

    async fn wait_online(&mut self) -> Result<()> {
        loop {
            match self.transport.next_event().await {
                Some(TransportEvent::Online) => return Ok(()),
                Some(TransportEvent::Stanza(elem)) => self.backlog.push(elem),
                Some(TransportEvent::Disconnected(reason)) => {
                    return Err(ConnectorError::connection(reason))
                }
                None => {
                    return Err(ConnectorError::connection(
                        "stream closed before authentication",
                    ))
                }
            }
        }
    }

    async fn wait_roster(&mut self) -> Result<Option<Element>> {
        loop {
            match self.transport.next_event().await {
                Some(TransportEvent::Stanza(elem)) => {
                    if !is_response_to(&elem, ROSTER_QUERY_ID, &self.jid.to_bare()) {
                        self.backlog.push(elem);
                        continue;
                    }
                    if elem.attr("type") == Some("error") {
                        return Err(ConnectorError::Request("roster request rejected".into()));
                    }
                    return Ok(elem.get_child("query", ns::ROSTER).cloned());
                }
                Some(TransportEvent::Online) => {}
                Some(TransportEvent::Disconnected(reason)) => {
                    return Err(ConnectorError::connection(reason))
                }
                None => return Err(ConnectorError::connection("stream closed during roster load")),
            }
        }
    }

    async fn run(mut self) {
        loop {
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                event = self.transport.next_event() => Step::Event(event),
            };

            let flow = match step {
                Step::Command(Some(command)) => self.handle_command(command).await,
                Step::Command(None) => {
                    debug!("All connector handles dropped");
                    self.close().await;
                    ControlFlow::Break(())
                }
                Step::Event(Some(TransportEvent::Stanza(elem))) => {
                    self.handle_stanza(elem).await;
                    ControlFlow::Continue(())
                }
                Step::Event(Some(TransportEvent::Online)) => ControlFlow::Continue(()),
                Step::Event(Some(TransportEvent::Disconnected(reason))) => {
                    self.connection_lost(reason);
                    ControlFlow::Break(())
                }
                Step::Event(None) => {
                    self.connection_lost("stream ended".to_string());
                    ControlFlow::Break(())
                }
            };

            if flow.is_break() {
                break;
            }
        }
    }

    async fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Join {
                domain,
                room,
                reply,
            } => {
                let _ = reply.send(self.join(&domain, &room).await);
            }
            Command::Part {
                domain,
                room,
                reply,
            } => {
                let _ = reply.send(self.part(&domain, &room).await);
            }
            Command::ListRooms { domain, reply } => self.list_rooms(domain, reply).await,
            Command::MessageJid { to, lines, reply } => {
                let _ = reply.send(self.message_jid(&to, lines).await);
            }
            Command::MessageMuc { room, lines, reply } => {
                let _ = reply.send(self.message_muc(&room, lines).await);
            }
            Command::SetTopic { room, topic, reply } => {
                let _ = reply.send(self.set_topic(&room, &topic).await);
            }
            Command::JoinedRooms { reply } => {
                let mut rooms: Vec<_> = self
                    .rooms
                    .iter()
                    .map(|(jid, session)| (jid.clone(), session.state))
                    .collect();
                rooms.sort_by_key(|(jid, _)| jid.to_string());
                let _ = reply.send(rooms);
            }
            Command::ShutDown { reply } => {
                self.close().await;
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn join(&mut self, domain: &str, room: &str) -> Result<()> {
        let occupant = normalize_jid(room, domain, self.config.room_nickname())?;
        let key = occupant.to_bare();
        if self.rooms.contains_key(&key) {
            debug!("Already in room with JID {}", key);
            return Ok(());
        }

        info!("Joining room: {}", occupant);
        self.transport.send(stanza::build_muc_join(&occupant)).await?;
        self.rooms.insert(
            key,
            RoomSession {
                occupant,
                state: RoomState::Joining,
            },
        );
        Ok(())
    }

    async fn part(&mut self, domain: &str, room: &str) -> Result<()> {
        let key = normalize_jid(room, domain, self.config.room_nickname())?.to_bare();
        match self.rooms.remove(&key) {
            Some(session) => {
                info!("Leaving room: {}", key);
                self.transport
                    .send(stanza::build_muc_leave(&session.occupant))
                    .await?;
                *self.leaving.entry(key).or_default() += 1;
                Ok(())
            }
            None => {
                debug!("Not in room with JID {}", key);
                Ok(())
            }
        }
    }

    async fn list_rooms(&mut self, domain: String, reply: Responder<Result<Vec<BareJid>>>) {
        self.pending.retain(|_, request| !request.is_abandoned());

        let id = format!("disco-{}", Uuid::new_v4());
        match self
            .transport
            .send(stanza::build_disco_items_query(&id, &domain))
            .await
        {
            Ok(()) => {
                self.pending
                    .insert(id, PendingRequest::RoomList { domain, reply });
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    async fn message_jid(&mut self, to: &Jid, lines: Vec<String>) -> Result<()> {
        for line in lines {
            debug!("Sending message to JID {}: {}", to, line);
            self.transport
                .send(stanza::build_chat_message(to, &encode_text(&line)))
                .await?;
        }
        Ok(())
    }

    async fn message_muc(&mut self, room: &str, lines: Vec<String>) -> Result<()> {
        let key = room_key(room, &self.config.muc_domain)?;
        if !self.rooms.contains_key(&key) {
            debug!("Not in room {}; dropping {} line(s)", key, lines.len());
            return Ok(());
        }
        for line in lines {
            debug!("Sending message to MUC {}: {}", key, line);
            self.transport
                .send(stanza::build_room_message(&key, &encode_text(&line)))
                .await?;
        }
        Ok(())
    }

    async fn set_topic(&mut self, room: &str, topic: &str) -> Result<()> {
        let key = room_key(room, &self.config.muc_domain)?;
        if !self.rooms.contains_key(&key) {
            debug!("Not in room {}; ignoring topic change", key);
            return Ok(());
        }
        debug!("Setting topic for MUC {}: {}", key, topic);
        self.transport
            .send(stanza::build_room_subject(&key, &encode_text(topic)))
            .await
    }

    async fn handle_stanza(&mut self, elem: Element) {
        match stanza::dispatch_stanza(elem) {
            Incoming::Event(event) => self.deliver(event),
            Incoming::RosterPush { id, from, event } => {
                if !self.is_own_account(from.as_ref()) {
                    if let Some(from) = from {
                        warn!("Ignoring roster push from {}", from);
                    }
                    return;
                }
                self.callback.dispatch(event, &mut self.roster);
                self.send_quietly(stanza::build_iq_result(&id, from.as_ref()))
                    .await;
            }
            Incoming::Ping { id, from } => {
                self.send_quietly(stanza::build_iq_result(&id, from.as_ref()))
                    .await;
            }
            Incoming::IqResponse { id, from, result } => self.complete_request(id, from, result),
            Incoming::Room { room, presence } => self.update_room(room, presence),
            Incoming::Ignored => {}
        }
    }

    /// Roster pushes may only come from our own account (RFC 6121 2.1.6).
    fn is_own_account(&self, from: Option<&Jid>) -> bool {
        from.map_or(true, |from| from.to_bare() == self.jid.to_bare())
    }

    /// Whether `from` is an occupant address of a room rather than a user.
    fn is_room_occupant(&self, from: &Jid) -> bool {
        if from.resource().is_none() {
            return false;
        }
        let bare = from.to_bare();
        self.rooms.contains_key(&bare) || bare.domain().to_string() == self.config.muc_domain
    }

    fn deliver(&mut self, event: InboundEvent) {
        let event = match event {
            InboundEvent::PrivateMessage { from, kind, body } if self.is_room_occupant(&from) => {
                let nick = from
                    .resource()
                    .map(|nick| nick.as_str().to_string())
                    .unwrap_or_default();
                InboundEvent::OccupantMessage {
                    room: from.to_bare(),
                    nick,
                    kind,
                    body,
                }
            }
            other => other,
        };
        if let InboundEvent::RoomMessage { room, nick, .. } = &event {
            let Some(session) = self.rooms.get(room) else {
                debug!("Ignoring message for room {} we are not in", room);
                return;
            };
            if session.occupant.resource().as_str() == nick {
                return;
            }
        }
        self.callback.dispatch(event, &mut self.roster);
    }

    fn update_room(&mut self, room: BareJid, presence: RoomPresence) {
        match presence {
            RoomPresence::Joined if self.leaving.contains_key(&room) => {
                debug!("Ignoring stale join confirmation for room {}", room);
            }
            RoomPresence::Joined => {
                if let Some(session) = self.rooms.get_mut(&room) {
                    info!("Joined room {}", room);
                    session.state = RoomState::Joined;
                }
            }
            RoomPresence::Left => {
                if let Some(count) = self.leaving.get_mut(&room) {
                    *count -= 1;
                    if *count == 0 {
                        self.leaving.remove(&room);
                    }
                    debug!("Room {} confirmed our leave", room);
                } else if self.rooms.remove(&room).is_some() {
                    warn!("Removed from room {}", room);
                }
            }
            RoomPresence::Error(condition) => {
                if self.rooms.contains_key(&room) {
                    warn!("Room {} rejected our presence: {}", room, condition);
                }
            }
        }
    }

    fn complete_request(
        &mut self,
        id: String,
        from: Option<Jid>,
        result: std::result::Result<Option<Element>, String>,
    ) {
        self.pending.retain(|_, request| !request.is_abandoned());
        let Some(request) = self.pending.remove(&id) else {
            debug!("Ignoring response to unknown request {}", id);
            return;
        };
        if !request.answered_by(from.as_ref()) {
            warn!("Ignoring response to {} from unexpected sender {:?}", id, from);
            self.pending.insert(id, request);
            return;
        }
        match request {
            PendingRequest::RoomList { reply, .. } => {
                let rooms = result
                    .map(|payload| stanza::parse_disco_items(payload.as_ref()))
                    .map_err(|condition| {
                        ConnectorError::Request(format!("room listing failed: {condition}"))
                    });
                let _ = reply.send(rooms);
            }
        }
    }

    async fn send_quietly(&mut self, elem: Element) {
        if let Err(e) = self.transport.send(elem).await {
            warn!("Failed to send stanza: {e}");
        }
    }

    fn connection_lost(&mut self, reason: String) {
        warn!("XMPP session lost: {}", reason);
        self.rooms.clear();
        self.leaving.clear();
        self.pending.clear();
        self.robot
            .trigger(LifecycleEvent::ShutdownRequested { reason });
        self.set_state(ConnectionState::Disconnected);
    }

    async fn close(&mut self) {
        self.set_state(ConnectionState::ShuttingDown);
        info!("Disconnecting from {}", self.config.server);
        if let Err(e) = self.transport.close().await {
            warn!("Encountered error during disconnect: {e}");
        }
        self.rooms.clear();
        self.leaving.clear();
        self.pending.clear();
        self.set_state(ConnectionState::Disconnected);
    }
}

/// Whether `elem` answers request `id`, sent by our server on behalf of
/// `own` or without a sender.
fn is_response_to(elem: &Element, id: &str, own: &BareJid) -> bool {
    elem.name() == "iq"
        && elem.attr("id") == Some(id)
        && matches!(elem.attr("type"), Some("result") | Some("error"))
        && elem.attr("from").map_or(true, |from| {
            Jid::from_str(from).is_ok_and(|from| from.to_bare() == *own)
        })
}
