// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Hipbot Contributors

//! Glue between a chat-bot host and the [`Connector`].
//!
//! The adapter owns the run loop: connect, announce, join the selected rooms,
//! publish the room directory, then wait for an interrupt or for the session
//! to fail before shutting down.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::address::room_id;
use crate::config::{ConnectorConfig, RoomSelection};
use crate::connector::Connector;
use crate::error::{ConnectorError, Result};
use crate::identity::Source;
use crate::robot::{LifecycleEvent, Robot};
use crate::transport::XmppTransport;

/// Host-facing adapter. Cheap to clone.
#[derive(Clone)]
pub struct Adapter {
    inner: Arc<AdapterInner>,
}

struct AdapterInner {
    config: ConnectorConfig,
    robot: Arc<dyn Robot>,
    connector: OnceCell<Connector>,
}

impl Adapter {
    pub fn new(config: ConnectorConfig, robot: Arc<dyn Robot>) -> Self {
        Self {
            inner: Arc::new(AdapterInner {
                config,
                robot,
                connector: OnceCell::new(),
            }),
        }
    }

    /// The running connector, once [`Adapter::run`] has connected.
    pub fn connector(&self) -> Result<&Connector> {
        self.inner.connector.get().ok_or(ConnectorError::Closed)
    }

    /// Run until Ctrl-C or until the session ends.
    pub async fn run<T: XmppTransport>(&self, transport: T) -> Result<()> {
        self.run_until(transport, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for interrupt: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `shutdown` resolves or the session ends, then shut down.
    pub async fn run_until<T, F>(&self, transport: T, shutdown: F) -> Result<()>
    where
        T: XmppTransport,
        F: Future<Output = ()>,
    {
        if self.inner.connector.initialized() {
            return Err(ConnectorError::connection("adapter is already running"));
        }

        let connector = Connector::connect(
            self.inner.config.clone(),
            self.inner.robot.clone(),
            transport,
        )
        .await?;
        if self.inner.connector.set(connector.clone()).is_err() {
            connector.shut_down().await;
            return Err(ConnectorError::connection("adapter is already running"));
        }
        self.inner.robot.trigger(LifecycleEvent::Connected);

        for room in self.rooms().await? {
            match self.join(&room).await {
                Ok(()) => {}
                Err(ConnectorError::Closed) => return Err(ConnectorError::Closed),
                Err(e) => warn!("Failed to join room {}: {e}", room),
            }
        }
        self.create_room_objects().await;

        tokio::select! {
            _ = shutdown => info!("Interrupted; shutting down"),
            _ = connector.closed() => info!("Session ended; shutting down"),
        }
        self.shut_down().await;
        Ok(())
    }

    /// Join a room and tell the host.
    pub async fn join(&self, room: &str) -> Result<()> {
        self.connector()?.join(self.muc_domain(), room).await?;
        self.inner.robot.trigger(LifecycleEvent::Joined {
            room: room.to_string(),
        });
        Ok(())
    }

    /// Tell the host, then leave the room.
    pub async fn part(&self, room: &str) -> Result<()> {
        self.inner.robot.trigger(LifecycleEvent::Parted {
            room: room.to_string(),
        });
        self.connector()?.part(self.muc_domain(), room).await
    }

    /// Reply to wherever `target` came from: the user for private messages,
    /// the room otherwise.
    pub async fn send_messages<I, S>(&self, target: &Source, lines: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let connector = self.connector()?;
        match &target.room {
            Some(room) => connector.message_muc(&room.to_string(), lines).await,
            None => match &target.user.id {
                Some(id) => connector.message_jid(&id.to_string(), lines).await,
                None => {
                    warn!("User {} has no address; dropping reply", target.user.name);
                    Ok(())
                }
            },
        }
    }

    /// Change the subject of the room `target` came from.
    pub async fn set_topic(&self, target: &Source, topic: &str) -> Result<()> {
        let Some(room) = &target.room else {
            warn!("Cannot set a topic outside a room");
            return Ok(());
        };
        self.connector()?.set_topic(&room.to_string(), topic).await
    }

    /// How the host should write a mention of `name`.
    pub fn mention_format(&self, name: &str) -> String {
        format!("@{name}")
    }

    /// Leave every room, close the session and tell the host.
    pub async fn shut_down(&self) {
        if let Ok(connector) = self.connector() {
            let rooms = connector.joined_rooms().await.unwrap_or_default();
            for room in rooms {
                let id = room_id(&room, self.muc_domain());
                if let Err(e) = self.part(&id).await {
                    warn!("Failed to leave room {}: {e}", id);
                }
            }
            connector.shut_down().await;
        }
        self.inner.robot.trigger(LifecycleEvent::Disconnected);
    }

    fn muc_domain(&self) -> &str {
        &self.inner.config.muc_domain
    }

    async fn rooms(&self) -> Result<Vec<String>> {
        match &self.inner.config.rooms {
            Some(RoomSelection::All) => Ok(self
                .connector()?
                .list_rooms(self.muc_domain())
                .await?
                .iter()
                .map(|room| room_id(room, self.muc_domain()))
                .collect()),
            Some(RoomSelection::List(rooms)) if !rooms.is_empty() => Ok(rooms.clone()),
            _ => Ok(self.inner.robot.persisted_rooms()),
        }
    }

    async fn create_room_objects(&self) {
        let Ok(connector) = self.connector() else {
            return;
        };
        match connector.list_rooms(self.muc_domain()).await {
            Ok(rooms) => {
                let ids: Vec<String> = rooms
                    .iter()
                    .map(|room| room_id(room, self.muc_domain()))
                    .collect();
                info!("Discovered {} rooms", ids.len());
                self.inner.robot.rooms_discovered(&ids);
            }
            Err(e) => warn!("Failed to list rooms: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::InboundMessage;

    struct Silent;

    impl Robot for Silent {
        fn receive(&self, _message: InboundMessage) {}
        fn trigger(&self, _event: LifecycleEvent) {}
    }

    #[test]
    fn mention_format_prefixes_at() {
        let adapter = Adapter::new(ConnectorConfig::new("bot", "secret"), Arc::new(Silent));
        assert_eq!(adapter.mention_format("carl"), "@carl");
    }

    #[tokio::test]
    async fn calls_before_run_report_closed() {
        let adapter = Adapter::new(ConnectorConfig::new("bot", "secret"), Arc::new(Silent));
        assert!(matches!(adapter.join("lobby").await, Err(ConnectorError::Closed)));
        assert!(matches!(adapter.connector(), Err(ConnectorError::Closed)));
    }
}
