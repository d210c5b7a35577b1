// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Hipbot Contributors

//! Minimal host pipeline: logs lifecycle events and answers `ping`.

use std::sync::{Arc, RwLock};

use hipbot_xmpp::{Adapter, InboundMessage, LifecycleEvent, Robot};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Host side of the connector. Messages are queued for [`respond`] so the
/// session driver never waits on a reply.
pub struct Host {
    inbox: mpsc::UnboundedSender<InboundMessage>,
    mention_name: RwLock<Option<String>>,
    ping: bool,
}

impl Host {
    pub fn new(ping: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<InboundMessage>) {
        let (inbox, rx) = mpsc::unbounded_channel();
        let host = Arc::new(Self {
            inbox,
            mention_name: RwLock::new(None),
            ping,
        });
        (host, rx)
    }

    /// The text of `message` if it is addressed to the bot.
    fn command_text<'a>(&self, message: &'a InboundMessage) -> Option<&'a str> {
        if message.command {
            return Some(message.body.trim());
        }
        let mention = self.mention_name.read().ok()?.clone()?;
        let rest = message.body.trim_start().strip_prefix('@')?;
        let rest = strip_prefix_ignore_case(rest, &mention)?;
        let ends_mention = rest.is_empty()
            || rest.starts_with(char::is_whitespace)
            || rest.starts_with([':', ',']);
        ends_mention.then(|| rest.trim_start_matches([':', ',']).trim())
    }

    /// The reply to `message`, if any.
    pub fn reply_to(&self, message: &InboundMessage) -> Option<String> {
        let text = self.command_text(message)?;
        if self.ping && text.eq_ignore_ascii_case("ping") {
            return Some("pong".to_string());
        }
        None
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

impl Robot for Host {
    fn receive(&self, message: InboundMessage) {
        if self.inbox.send(message).is_err() {
            debug!("Responder stopped; dropping message");
        }
    }

    fn trigger(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Connected => info!("Connected"),
            LifecycleEvent::Disconnected => info!("Disconnected"),
            LifecycleEvent::Joined { room } => info!(room = %room, "Joined room"),
            LifecycleEvent::Parted { room } => info!(room = %room, "Left room"),
            LifecycleEvent::ShutdownRequested { reason } => {
                warn!(reason = %reason, "Connection lost")
            }
        }
    }

    fn set_mention_name(&self, mention_name: &str) {
        info!("Mention name is @{}", mention_name);
        if let Ok(mut current) = self.mention_name.write() {
            *current = Some(mention_name.to_string());
        }
    }

    fn rooms_discovered(&self, rooms: &[String]) {
        info!("{} rooms available", rooms.len());
    }
}

/// Reply to queued messages until the inbox closes.
pub async fn respond(
    adapter: Adapter,
    host: Arc<Host>,
    mut inbox: mpsc::UnboundedReceiver<InboundMessage>,
) {
    while let Some(message) = inbox.recv().await {
        debug!(user = %message.source.user.name, body = %message.body, "Received message");
        let Some(reply) = host.reply_to(&message) else {
            continue;
        };
        if let Err(e) = adapter.send_messages(&message.source, [reply]).await {
            warn!("Failed to reply to {}: {e}", message.source.user.name);
        }
    }
}
