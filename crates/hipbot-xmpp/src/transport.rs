// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Hipbot Contributors

//! Transport seam between the session driver and the XMPP stream.
//!
//! - [`TokioXmppTransport`]: StartTLS client via `tokio-xmpp`
//! - [`MemoryTransport`]: in-process pair, the other end held by a [`MemoryPeer`]

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use minidom::Element;
use tokio::sync::mpsc;
use tokio_xmpp::starttls::ServerConfig;
use tokio_xmpp::{AsyncClient, AsyncConfig, Event as TokioXmppEvent};
use tracing::{info, trace};
use xmpp_parsers::jid::{FullJid, Jid};

use crate::config::ConnectorConfig;
use crate::error::{ConnectorError, Result};

/// Events surfaced by a transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The stream is authenticated and bound.
    Online,
    /// An inbound stanza.
    Stanza(Element),
    /// The stream failed or was closed by the server.
    Disconnected(String),
}

/// Platform-abstracted XMPP stream.
///
/// `next_event` must be cancel-safe: the session driver polls it inside
/// `tokio::select!`.
#[async_trait]
pub trait XmppTransport: Send + 'static {
    /// Next inbound event; `None` once the stream has ended.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Send one stanza, waiting for the write to be accepted.
    async fn send(&mut self, stanza: Element) -> Result<()>;

    /// Close the stream.
    async fn close(&mut self) -> Result<()>;
}

/// Network transport backed by `tokio_xmpp::AsyncClient`.
///
/// Reconnection is disabled: a failed connect or a dropped stream ends the
/// event stream and the session with it.
pub struct TokioXmppTransport {
    client: AsyncClient<ServerConfig>,
    log_stanzas: bool,
}

impl TokioXmppTransport {
    /// Create the client. The connection is opened on the first poll.
    pub fn new(config: &ConnectorConfig) -> Result<Self> {
        let jid: FullJid = config.own_jid()?;
        let password = config.password()?.to_string();

        info!(
            "Creating XMPP client for {} via {}:{}",
            jid, config.server, config.port
        );
        if config.debug {
            info!("Enabling XMPP stanza log");
        }

        let client_config = AsyncConfig {
            jid: Jid::from(jid),
            password,
            server: ServerConfig::Manual {
                host: config.server.clone(),
                port: config.port,
            },
        };

        let mut client = AsyncClient::new_with_config(client_config);
        client.set_reconnect(false);

        Ok(Self {
            client,
            log_stanzas: config.debug,
        })
    }
}

#[async_trait]
impl XmppTransport for TokioXmppTransport {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        match self.client.next().await? {
            TokioXmppEvent::Online { .. } => Some(TransportEvent::Online),
            TokioXmppEvent::Disconnected(err) => Some(TransportEvent::Disconnected(err.to_string())),
            TokioXmppEvent::Stanza(elem) => {
                if self.log_stanzas {
                    trace!("RECV: {}", String::from(&elem));
                }
                Some(TransportEvent::Stanza(elem))
            }
        }
    }

    async fn send(&mut self, stanza: Element) -> Result<()> {
        if self.log_stanzas {
            trace!("SEND: {}", String::from(&stanza));
        }
        self.client
            .send_stanza(stanza)
            .await
            .map_err(|e| ConnectorError::transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.client
            .send_end()
            .await
            .map_err(|e| ConnectorError::transport(e.to_string()))
    }
}

/// In-process transport. Inbound events are pushed by the paired
/// [`MemoryPeer`]; outbound stanzas are handed to it.
pub struct MemoryTransport {
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    outbound: mpsc::UnboundedSender<Element>,
    fail_close: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

/// The far end of a [`MemoryTransport`], playing the server.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<TransportEvent>>,
    outbound: mpsc::UnboundedReceiver<Element>,
    fail_close: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl MemoryTransport {
    pub fn pair() -> (MemoryTransport, MemoryPeer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let fail_close = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));
        (
            MemoryTransport {
                inbound: in_rx,
                outbound: out_tx,
                fail_close: fail_close.clone(),
                closed: closed.clone(),
            },
            MemoryPeer {
                inbound: Some(in_tx),
                outbound: out_rx,
                fail_close,
                closed,
            },
        )
    }
}

#[async_trait]
impl XmppTransport for MemoryTransport {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.inbound.recv().await
    }

    async fn send(&mut self, stanza: Element) -> Result<()> {
        self.outbound
            .send(stanza)
            .map_err(|_| ConnectorError::transport("peer dropped"))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(ConnectorError::transport("connection reset by peer"));
        }
        Ok(())
    }
}

impl MemoryPeer {
    /// Deliver an event to the transport.
    pub fn push(&self, event: TransportEvent) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(event);
        }
    }

    /// Deliver a stanza given as XML text.
    pub fn push_xml(&self, xml: &str) -> Result<()> {
        let elem = Element::from_str(xml)
            .map_err(|e| ConnectorError::transport(format!("invalid XML: {e}")))?;
        self.push(TransportEvent::Stanza(elem));
        Ok(())
    }

    /// End the inbound stream, as if the socket closed.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Wait for the next stanza the transport sent.
    pub async fn next_sent(&mut self) -> Option<Element> {
        self.outbound.recv().await
    }

    /// Stanzas sent so far and not yet taken.
    pub fn drain_sent(&mut self) -> Vec<Element> {
        let mut sent = Vec::new();
        while let Ok(elem) = self.outbound.try_recv() {
            sent.push(elem);
        }
        sent
    }

    /// Make the next `close` fail with an I/O-style error.
    pub fn fail_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
