// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Hipbot Contributors

//! Connector configuration.
//!
//! The connector never reads ambient settings: everything it needs is in an
//! immutable [`ConnectorConfig`] handed over at construction.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use xmpp_parsers::jid::FullJid;

use crate::address::{normalize_jid, DEFAULT_CHAT_DOMAIN, DEFAULT_RESOURCE};
use crate::error::{ConnectorError, Result};

/// Default MUC service domain.
pub const DEFAULT_MUC_DOMAIN: &str = "conf.hipchat.com";

/// What to do with a room message whose sender is not in the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownUserPolicy {
    /// Drop the message.
    Drop,
    /// Deliver it with an ephemeral, reply-less identity.
    #[default]
    Synthesize,
}

/// Which rooms the adapter joins at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RoomsRepr")]
pub enum RoomSelection {
    /// Every room the MUC service lists.
    All,
    /// An explicit list of room names or addresses.
    List(Vec<String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RoomsRepr {
    Keyword(String),
    List(Vec<String>),
}

impl TryFrom<RoomsRepr> for RoomSelection {
    type Error = String;

    fn try_from(value: RoomsRepr) -> std::result::Result<Self, Self::Error> {
        match value {
            RoomsRepr::Keyword(k) if k == "all" => Ok(RoomSelection::All),
            RoomsRepr::Keyword(other) => Err(format!(
                "rooms must be \"all\" or a list of rooms, got \"{other}\""
            )),
            RoomsRepr::List(rooms) => Ok(RoomSelection::List(rooms)),
        }
    }
}

/// XMPP connector configuration
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Bot account JID; a bare local part gets the default chat domain
    pub jid: Option<String>,
    /// Account password
    pub password: Option<String>,
    /// XMPP server host
    pub server: String,
    /// Port (default 5222)
    pub port: u16,
    /// MUC (Multi-User Chat) domain
    pub muc_domain: String,
    /// Nickname used in rooms; defaults to the session resource
    pub nickname: Option<String>,
    /// Log every stanza sent and received
    pub debug: bool,
    /// Rooms to join; `None` defers to the host's persisted rooms
    pub rooms: Option<RoomSelection>,
    /// Handling of room senders missing from the roster
    pub unknown_users: UnknownUserPolicy,
    /// Upper bound for roster load and room listing round-trips
    pub request_timeout_secs: u64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            jid: None,
            password: None,
            server: DEFAULT_CHAT_DOMAIN.into(),
            port: 5222,
            muc_domain: DEFAULT_MUC_DOMAIN.into(),
            nickname: None,
            debug: false,
            rooms: None,
            unknown_users: UnknownUserPolicy::default(),
            request_timeout_secs: 10,
        }
    }
}

impl fmt::Debug for ConnectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorConfig")
            .field("jid", &self.jid)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("server", &self.server)
            .field("port", &self.port)
            .field("muc_domain", &self.muc_domain)
            .field("nickname", &self.nickname)
            .field("debug", &self.debug)
            .field("rooms", &self.rooms)
            .field("unknown_users", &self.unknown_users)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl ConnectorConfig {
    /// Config with the two required fields set.
    pub fn new(jid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            jid: Some(jid.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    /// Fail when the jid or password is missing or blank.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if is_blank(&self.jid) {
            missing.push("jid");
        }
        if is_blank(&self.password) {
            missing.push("password");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConnectorError::MissingCredentials(missing))
        }
    }

    /// The bot's canonical full JID.
    pub fn own_jid(&self) -> Result<FullJid> {
        let jid = self
            .jid
            .as_deref()
            .ok_or(ConnectorError::MissingCredentials(vec!["jid"]))?;
        normalize_jid(jid, DEFAULT_CHAT_DOMAIN, DEFAULT_RESOURCE)
    }

    pub fn password(&self) -> Result<&str> {
        self.password
            .as_deref()
            .ok_or(ConnectorError::MissingCredentials(vec!["password"]))
    }

    /// Nickname used as the resource of room occupant JIDs.
    pub fn room_nickname(&self) -> &str {
        self.nickname
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_RESOURCE)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ConnectorConfig::default();
        assert_eq!(config.server, "chat.hipchat.com");
        assert_eq!(config.muc_domain, "conf.hipchat.com");
        assert_eq!(config.port, 5222);
        assert_eq!(config.unknown_users, UnknownUserPolicy::Synthesize);
        assert!(config.rooms.is_none());
        assert_eq!(config.room_nickname(), "bot");
    }

    #[test]
    fn validate_reports_missing_credentials() {
        let err = ConnectorConfig::default().validate().unwrap_err();
        match err {
            ConnectorError::MissingCredentials(fields) => {
                assert_eq!(fields, vec!["jid", "password"]);
            }
            other => panic!("Expected MissingCredentials, got {:?}", other),
        }

        let mut config = ConnectorConfig::new("user", "   ");
        assert!(config.validate().is_err());
        config.password = Some("secret".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn own_jid_is_normalized() {
        let config = ConnectorConfig::new("user", "secret");
        assert_eq!(config.own_jid().unwrap().to_string(), "user@chat.hipchat.com/bot");
    }

    #[test]
    fn debug_output_redacts_password() {
        let config = ConnectorConfig::new("user", "hunter2");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn rooms_deserialize_from_keyword_or_list() {
        let config: ConnectorConfig = toml::from_str("rooms = \"all\"").unwrap();
        assert_eq!(config.rooms, Some(RoomSelection::All));

        let config: ConnectorConfig = toml::from_str("rooms = [\"a\", \"b\"]").unwrap();
        assert_eq!(
            config.rooms,
            Some(RoomSelection::List(vec!["a".into(), "b".into()]))
        );

        assert!(toml::from_str::<ConnectorConfig>("rooms = \"some\"").is_err());
    }

    #[test]
    fn unknown_users_policy_deserializes() {
        let config: ConnectorConfig = toml::from_str("unknown_users = \"drop\"").unwrap();
        assert_eq!(config.unknown_users, UnknownUserPolicy::Drop);
    }
}
