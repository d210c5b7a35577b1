// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Hipbot Contributors

//! Roster snapshot.
//!
//! HipChat rosters carry `mention_name` and `email` attributes on each
//! `<item/>` that `xmpp_parsers::roster::Item` does not model, so items are
//! read straight from the `jabber:iq:roster` query element.
//!
//! ```xml
//! <query xmlns='jabber:iq:roster'>
//!   <item jid='1_carl@chat.hipchat.com' name='Carl Pug'
//!         mention_name='carl' email='carl@example.com' subscription='both'/>
//! </query>
//! ```

use std::collections::HashMap;
use std::str::FromStr;

use minidom::Element;
use tracing::{debug, warn};
use xmpp_parsers::jid::BareJid;
use xmpp_parsers::ns;

use crate::identity::UserIdentity;

/// A known contact with its display metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub jid: BareJid,
    pub name: Option<String>,
    pub mention_name: Option<String>,
    pub email: Option<String>,
}

impl RosterEntry {
    pub fn new(jid: BareJid, name: Option<String>, mention_name: Option<String>) -> Self {
        Self {
            jid,
            name,
            mention_name,
            email: None,
        }
    }

    /// Identity record for this contact. Contacts without a display name
    /// fall back to the local part of their address.
    pub fn identity(&self) -> UserIdentity {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| fallback_name(&self.jid));
        UserIdentity::new(self.jid.clone(), name, self.mention_name.clone())
    }
}

/// Display name used when nothing better is known about an address.
pub(crate) fn fallback_name(jid: &BareJid) -> String {
    jid.node()
        .map(|n| n.to_string())
        .unwrap_or_else(|| jid.to_string())
}

/// Insertion-ordered contact list keyed by bare address.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: HashMap<BareJid, RosterEntry>,
    order: Vec<BareJid>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Insert or replace the entry for `entry.jid`. Replacing keeps the
    /// original position.
    pub fn upsert(&mut self, entry: RosterEntry) {
        if !self.entries.contains_key(&entry.jid) {
            self.order.push(entry.jid.clone());
        }
        self.entries.insert(entry.jid.clone(), entry);
    }

    pub fn get(&self, jid: &BareJid) -> Option<&RosterEntry> {
        self.entries.get(jid)
    }

    /// First entry, in roster order, whose display name equals `name`.
    pub fn find_by_name(&self, name: &str) -> Option<&RosterEntry> {
        self.iter().find(|entry| entry.name.as_deref() == Some(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RosterEntry> {
        self.order.iter().filter_map(|jid| self.entries.get(jid))
    }
}

/// Extract roster entries from a `jabber:iq:roster` query element.
///
/// Items with `subscription='remove'` are skipped; invalid JIDs are logged
/// and skipped.
pub fn parse_roster_query(query: &Element) -> Vec<RosterEntry> {
    if !query.is("query", ns::ROSTER) {
        return vec![];
    }

    query
        .children()
        .filter(|child| child.is("item", ns::ROSTER))
        .filter_map(|item| {
            let jid_attr = item.attr("jid")?;
            if item.attr("subscription") == Some("remove") {
                debug!("Ignoring roster removal for {}", jid_attr);
                return None;
            }
            let jid = match BareJid::from_str(jid_attr) {
                Ok(jid) => jid,
                Err(e) => {
                    warn!("Skipping roster item with invalid JID {}: {e}", jid_attr);
                    return None;
                }
            };
            Some(RosterEntry {
                jid,
                name: non_empty(item.attr("name")),
                mention_name: non_empty(item.attr("mention_name")),
                email: non_empty(item.attr("email")),
            })
        })
        .collect()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jid(s: &str) -> BareJid {
        BareJid::from_str(s).unwrap()
    }

    fn query(xml: &str) -> Element {
        xml.parse().unwrap()
    }

    #[test]
    fn parses_hipchat_attributes() {
        let elem = query(
            r#"<query xmlns='jabber:iq:roster'>
                 <item jid='carl@x.com' name='Carl' mention_name='carlthepug'
                       email='carl@example.com' subscription='both'/>
                 <item jid='dana@x.com' subscription='both'/>
               </query>"#,
        );
        let entries = parse_roster_query(&elem);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].jid, jid("carl@x.com"));
        assert_eq!(entries[0].name.as_deref(), Some("Carl"));
        assert_eq!(entries[0].mention_name.as_deref(), Some("carlthepug"));
        assert_eq!(entries[0].email.as_deref(), Some("carl@example.com"));
        assert_eq!(entries[1].name, None);
    }

    #[test]
    fn skips_removals_and_bad_jids() {
        let elem = query(
            r#"<query xmlns='jabber:iq:roster'>
                 <item jid='gone@x.com' subscription='remove'/>
                 <item jid='@bad' name='Bad'/>
                 <item jid='ok@x.com' name='Ok'/>
               </query>"#,
        );
        let entries = parse_roster_query(&elem);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].jid, jid("ok@x.com"));
    }

    #[test]
    fn ignores_other_namespaces() {
        let elem = query("<query xmlns='http://jabber.org/protocol/disco#items'/>");
        assert!(parse_roster_query(&elem).is_empty());
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut roster = Roster::new();
        roster.upsert(RosterEntry::new(jid("a@x.com"), Some("A".into()), None));
        roster.upsert(RosterEntry::new(jid("b@x.com"), Some("B".into()), None));
        roster.upsert(RosterEntry::new(jid("a@x.com"), Some("A2".into()), None));

        assert_eq!(roster.len(), 2);
        let names: Vec<_> = roster.iter().filter_map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["A2", "B"]);
    }

    #[test]
    fn find_by_name_returns_first_match() {
        let mut roster = Roster::new();
        roster.upsert(RosterEntry::new(jid("first@x.com"), Some("Sam".into()), None));
        roster.upsert(RosterEntry::new(jid("second@x.com"), Some("Sam".into()), None));

        let found = roster.find_by_name("Sam").unwrap();
        assert_eq!(found.jid, jid("first@x.com"));
        assert!(roster.find_by_name("Nobody").is_none());
    }

    #[test]
    fn identity_falls_back_to_local_part() {
        let entry = RosterEntry::new(jid("carl@x.com"), None, None);
        let identity = entry.identity();
        assert_eq!(identity.name, "carl");
        assert_eq!(identity.id, Some(jid("carl@x.com")));
    }
}
