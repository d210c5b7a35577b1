// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Hipbot Contributors

//! Address canonicalization.
//!
//! Every address the connector stores or compares is produced here: the bot's
//! own JID, room occupant JIDs and the bare room keys used for membership
//! lookups. Call sites never assemble JIDs by string concatenation.

use std::str::FromStr;

use xmpp_parsers::jid::{BareJid, FullJid, Jid};

use crate::error::{ConnectorError, Result};

/// Domain substituted when the bot's own JID is given as a bare local part.
pub const DEFAULT_CHAT_DOMAIN: &str = "chat.hipchat.com";

/// Resource the bot binds its session to.
pub const DEFAULT_RESOURCE: &str = "bot";

/// Normalize `address` to `local@domain`.
///
/// Accepts a bare local part (`room`), a `local@domain` pair or a full
/// `local@domain/resource` address. When no local part is present the whole
/// input is taken as the local part and `default_domain` is used.
pub fn normalize_bare(address: &str, default_domain: &str) -> Result<BareJid> {
    let (node, domain) = split_address(address, default_domain)?;
    BareJid::from_str(&format!("{node}@{domain}"))
        .map_err(|e| ConnectorError::invalid_address(format!("{address}: {e}")))
}

/// Normalize `address` to `local@domain/resource`.
///
/// Same rules as [`normalize_bare`]; the resource is always replaced by
/// `resource`, whatever the input carried.
pub fn normalize_jid(address: &str, default_domain: &str, resource: &str) -> Result<FullJid> {
    if resource.is_empty() {
        return Err(ConnectorError::invalid_address(format!(
            "{address}: empty resource"
        )));
    }
    let bare = normalize_bare(address, default_domain)?;
    FullJid::from_str(&format!("{bare}/{resource}"))
        .map_err(|e| ConnectorError::invalid_address(format!("{address}: {e}")))
}

/// Canonical membership key for a room.
pub fn room_key(room: &str, muc_domain: &str) -> Result<BareJid> {
    normalize_bare(room, muc_domain)
}

/// Host-facing room id: the local part when the room lives on `muc_domain`,
/// the full bare address otherwise.
pub fn room_id(room: &BareJid, muc_domain: &str) -> String {
    match room.node() {
        Some(node) if room.domain().to_string() == muc_domain => node.to_string(),
        _ => room.to_string(),
    }
}

fn split_address(address: &str, default_domain: &str) -> Result<(String, String)> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(ConnectorError::invalid_address("empty address"));
    }

    let jid = Jid::from_str(trimmed)
        .map_err(|e| ConnectorError::invalid_address(format!("{trimmed}: {e}")))?;

    match jid.node() {
        Some(node) => Ok((node.to_string(), jid.domain().to_string())),
        None => Ok((jid.domain().to_string(), default_domain.to_string())),
    }
}
