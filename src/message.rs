// Copyright (c) 2026 XMChat contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! One-to-one chat messages and their mapping to message stanzas.

use chrono::{DateTime, Utc};
use jid::Jid;
use minidom::Element;
use rand::{thread_rng, Rng};

use crate::ns;

pub(crate) fn make_id() -> String {
    let id: u64 = thread_rng().gen();
    format!("{}", id)
}

/// A chat message on its way to a correspondent.
///
/// Consumed once the transport accepts it for delivery; also carried by
/// [`Event::MessageSent`].
///
/// [`Event::MessageSent`]: crate::Event::MessageSent
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// The correspondent the message is addressed to (bare or full JID).
    pub to: Jid,
    /// Message body.
    pub body: String,
    /// When the message was handed to the session.
    pub timestamp: DateTime<Utc>,
}

impl OutboundMessage {
    pub(crate) fn new(to: Jid, body: impl Into<String>) -> Self {
        Self {
            to,
            body: body.into(),
            timestamp: Utc::now(),
        }
    }

    /// Build the `<message type="chat">` stanza for this message.
    pub(crate) fn to_stanza(&self) -> Element {
        Element::builder("message", ns::JABBER_CLIENT)
            .attr("to", self.to.to_string())
            .attr("type", "chat")
            .attr("id", make_id())
            .append(
                Element::builder("body", ns::JABBER_CLIENT)
                    .append(self.body.clone())
                    .build(),
            )
            .build()
    }
}

/// A chat message received from a correspondent.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// The sending correspondent, as addressed on the stanza.
    pub from: Jid,
    /// Message body.
    pub body: String,
    /// When the message was read off the stream.
    pub timestamp: DateTime<Utc>,
}

/// Map an incoming stanza to an [`InboundMessage`], if it is a chat message
/// we can represent.
///
/// Everything else is dropped here with a log line; an unexpected stanza
/// must never take the session down.
pub(crate) fn parse_chat(stanza: &Element) -> Option<InboundMessage> {
    if !stanza.is("message", ns::JABBER_CLIENT) {
        debug!(
            "ignoring non-message stanza <{} xmlns='{}'/>",
            stanza.name(),
            stanza.ns()
        );
        return None;
    }
    match stanza.attr("type") {
        None | Some("chat") | Some("normal") => (),
        Some(other) => {
            debug!("ignoring message of type {:?}", other);
            return None;
        }
    }
    let from = match stanza.attr("from") {
        Some(from) => match from.parse::<Jid>() {
            Ok(jid) => jid,
            Err(e) => {
                warn!("dropping message with unparseable from {:?}: {}", from, e);
                return None;
            }
        },
        None => {
            debug!("dropping message without from attribute");
            return None;
        }
    };
    let body = match stanza.get_child("body", ns::JABBER_CLIENT) {
        Some(body) => body.text(),
        None => {
            debug!("received chat message without body, ignoring");
            return None;
        }
    };
    if body.is_empty() {
        debug!("received chat message with empty body, ignoring");
        return None;
    }
    Some(InboundMessage {
        from,
        body,
        timestamp: Utc::now(),
    })
}
