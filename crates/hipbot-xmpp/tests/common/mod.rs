// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Hipbot Contributors

//! Test utilities: a recording host and a scripted in-memory server.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use hipbot_xmpp::connector::ROSTER_QUERY_ID;
use hipbot_xmpp::{
    Connector, ConnectorConfig, InboundMessage, LifecycleEvent, MemoryPeer, MemoryTransport,
    Robot, TransportEvent,
};
use minidom::Element;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub const CARL_ROSTER: &str = "<query xmlns='jabber:iq:roster'>\
    <item jid='carl@x.com' name='Carl' mention_name='Carl' subscription='both'/>\
    <item jid='bot@x.com' name='Hip Bot' mention_name='hipbot' subscription='both'/>\
    </query>";

/// Host that records everything the connector hands it.
pub struct RecordingRobot {
    messages: mpsc::UnboundedSender<InboundMessage>,
    events: mpsc::UnboundedSender<LifecycleEvent>,
    pub mention_name: Mutex<Option<String>>,
    pub persisted: Vec<String>,
    pub discovered: Mutex<Vec<String>>,
}

pub struct RobotProbe {
    pub messages: mpsc::UnboundedReceiver<InboundMessage>,
    pub events: mpsc::UnboundedReceiver<LifecycleEvent>,
}

impl RecordingRobot {
    pub fn new() -> (Arc<Self>, RobotProbe) {
        Self::with_persisted_rooms(Vec::new())
    }

    pub fn with_persisted_rooms(rooms: Vec<String>) -> (Arc<Self>, RobotProbe) {
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let robot = Arc::new(Self {
            messages: messages_tx,
            events: events_tx,
            mention_name: Mutex::new(None),
            persisted: rooms,
            discovered: Mutex::new(Vec::new()),
        });
        (
            robot,
            RobotProbe {
                messages: messages_rx,
                events: events_rx,
            },
        )
    }
}

impl Robot for RecordingRobot {
    fn receive(&self, message: InboundMessage) {
        let _ = self.messages.send(message);
    }

    fn trigger(&self, event: LifecycleEvent) {
        let _ = self.events.send(event);
    }

    fn set_mention_name(&self, mention_name: &str) {
        *self.mention_name.lock().unwrap() = Some(mention_name.to_string());
    }

    fn persisted_rooms(&self) -> Vec<String> {
        self.persisted.clone()
    }

    fn rooms_discovered(&self, rooms: &[String]) {
        self.discovered.lock().unwrap().extend_from_slice(rooms);
    }
}

impl RobotProbe {
    pub async fn next_message(&mut self) -> InboundMessage {
        timeout(DEFAULT_TIMEOUT, self.messages.recv())
            .await
            .expect("timed out waiting for a delivery")
            .expect("robot dropped")
    }

    pub async fn next_event(&mut self) -> LifecycleEvent {
        timeout(DEFAULT_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for a lifecycle event")
            .expect("robot dropped")
    }

    pub fn drain_events(&mut self) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn config() -> ConnectorConfig {
    let mut config = ConnectorConfig::new("bot@x.com", "secret");
    config.muc_domain = "conf.x.com".into();
    config.request_timeout_secs = 2;
    config
}

pub fn roster_result(query: &str) -> String {
    format!("<iq xmlns='jabber:client' type='result' id='{ROSTER_QUERY_ID}'>{query}</iq>")
}

/// Queue what a server sends during login: stream online, then the roster.
pub fn script_login(peer: &MemoryPeer, roster: &str) {
    peer.push(TransportEvent::Online);
    peer.push_xml(&roster_result(roster)).unwrap();
}

/// Connect a session against a memory peer that already answered login.
pub async fn connected(config: ConnectorConfig) -> (Connector, MemoryPeer, RobotProbe) {
    let (robot, probe) = RecordingRobot::new();
    let (transport, mut peer) = MemoryTransport::pair();
    script_login(&peer, CARL_ROSTER);

    let connector = timeout(DEFAULT_TIMEOUT, Connector::connect(config, robot, transport))
        .await
        .expect("connect timed out")
        .expect("connect failed");

    let login = peer.drain_sent();
    assert_eq!(login.len(), 2, "roster query and initial presence");
    (connector, peer, probe)
}

pub async fn next_sent(peer: &mut MemoryPeer) -> Element {
    timeout(DEFAULT_TIMEOUT, peer.next_sent())
        .await
        .expect("timed out waiting for an outbound stanza")
        .expect("transport dropped")
}

/// Answer a disco#items request with the given room addresses.
pub fn disco_result(request: &Element, rooms: &[&str]) -> String {
    let id = request.attr("id").expect("request id");
    let items: String = rooms
        .iter()
        .map(|room| format!("<item jid='{room}'/>"))
        .collect();
    format!(
        "<iq xmlns='jabber:client' type='result' id='{id}' from='conf.x.com'>\
         <query xmlns='http://jabber.org/protocol/disco#items'>{items}</query></iq>"
    )
}

pub fn body(elem: &Element) -> Option<String> {
    elem.get_child("body", "jabber:client").map(|b| b.text())
}
