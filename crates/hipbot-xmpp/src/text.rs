// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Hipbot Contributors

//! Outbound text re-encoding.
//!
//! Everything the host asks us to send passes through [`encode_text`] before
//! it is placed in a stanza. XML 1.0 cannot carry most C0 control characters
//! or the non-characters U+FFFE/U+FFFF; a single such character would make
//! the server drop the whole stream, so they are replaced with U+FFFD.

use std::borrow::Cow;

/// Returns true if `ch` may appear in XML 1.0 character data.
fn is_xml_char(ch: char) -> bool {
    matches!(
        ch,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}'
    )
}

/// Replace characters XML cannot carry with U+FFFD.
///
/// Borrows the input when nothing needs replacing.
pub fn encode_text(input: &str) -> Cow<'_, str> {
    if input.chars().all(is_xml_char) {
        return Cow::Borrowed(input);
    }
    Cow::Owned(
        input
            .chars()
            .map(|ch| if is_xml_char(ch) { ch } else { char::REPLACEMENT_CHARACTER })
            .collect(),
    )
}

/// Decode possibly invalid UTF-8, then apply [`encode_text`].
pub fn encode_bytes(input: &[u8]) -> String {
    encode_text(&String::from_utf8_lossy(input)).into_owned()
}
