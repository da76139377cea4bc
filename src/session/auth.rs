// Copyright (c) 2026 XMChat contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! SASL negotiation and resource binding for one c2s stream.

use std::collections::HashSet;

use base64::{engine::general_purpose::STANDARD as Base64, Engine as _};
use futures::{SinkExt, StreamExt};
use jid::FullJid;
use minidom::Element;
use sasl::client::mechanisms::{Plain, Scram};
use sasl::client::Mechanism;
use sasl::common::scram::{Sha1, Sha256};
use sasl::common::Credentials;

use crate::config::ResolvedConfig;
use crate::connect::AsyncReadAndWrite;
use crate::error::{AuthError, Error, ProtocolError};
use crate::ns;
use crate::xmlstream::{Packet, XmppStream};

pub(crate) const BIND_REQ_ID: &str = "resource-bind";

/// Authenticate the stream with the strongest mechanism both sides support.
///
/// On success the caller must restart the stream before using it further.
pub(crate) async fn negotiate<Io: AsyncReadAndWrite>(
    stream: &mut XmppStream<Io>,
    config: &ResolvedConfig,
) -> Result<(), Error> {
    let creds = Credentials::default()
        .with_username(config.username.clone())
        .with_password(config.password.clone());

    let remote_mechs: HashSet<String> = stream.features.sasl_mechanisms.iter().cloned().collect();

    // Strongest first.
    let mut mechanism: Box<dyn Mechanism + Send + Sync> = if remote_mechs.contains("SCRAM-SHA-256")
    {
        Box::new(Scram::<Sha256>::from_credentials(creds).map_err(AuthError::Sasl)?)
    } else if remote_mechs.contains("SCRAM-SHA-1") {
        Box::new(Scram::<Sha1>::from_credentials(creds).map_err(AuthError::Sasl)?)
    } else if remote_mechs.contains("PLAIN") {
        Box::new(Plain::from_credentials(creds).map_err(AuthError::Sasl)?)
    } else {
        return Err(AuthError::NoMechanism.into());
    };

    debug!("authenticating via {}", mechanism.name());
    let initial = mechanism.initial();
    let auth = Element::builder("auth", ns::SASL)
        .attr("mechanism", mechanism.name())
        .append(Base64.encode(&initial))
        .build();
    stream.send(Packet::Stanza(auth)).await?;

    loop {
        match stream.next().await {
            Some(Ok(Packet::Stanza(stanza))) => {
                if stanza.is("challenge", ns::SASL) {
                    let challenge = Base64
                        .decode(stanza.text())
                        .map_err(ProtocolError::from)?;
                    let response = mechanism.response(&challenge).map_err(AuthError::Sasl)?;

                    // Send response and loop
                    let response = Element::builder("response", ns::SASL)
                        .append(Base64.encode(&response))
                        .build();
                    stream.send(Packet::Stanza(response)).await?;
                } else if stanza.is("success", ns::SASL) {
                    return Ok(());
                } else if stanza.is("failure", ns::SASL) {
                    let condition = stanza
                        .children()
                        .next()
                        .map(|child| child.name().to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    return Err(Error::Auth(AuthError::Fail(condition)));
                } else {
                    // ignore and loop
                }
            }
            Some(Ok(_)) => {
                // ignore and loop
            }
            Some(Err(e)) => return Err(e),
            None => return Err(Error::Disconnected),
        }
    }
}

/// Bind a resource on an authenticated, restarted stream.
///
/// The server picks the resource; returns the resulting full JID, or `None`
/// when the server does not offer binding.
pub(crate) async fn bind<Io: AsyncReadAndWrite>(
    stream: &mut XmppStream<Io>,
) -> Result<Option<FullJid>, Error> {
    if !stream.features.can_bind {
        // No resource binding available, do nothing.
        return Ok(None);
    }

    let iq = Element::builder("iq", ns::JABBER_CLIENT)
        .attr("type", "set")
        .attr("id", BIND_REQ_ID)
        .append(Element::builder("bind", ns::BIND).build())
        .build();
    stream.send(Packet::Stanza(iq)).await?;

    loop {
        match stream.next().await {
            Some(Ok(Packet::Stanza(el)))
                if el.is("iq", ns::JABBER_CLIENT) && el.attr("id") == Some(BIND_REQ_ID) =>
            {
                if el.attr("type") != Some("result") {
                    return Err(ProtocolError::InvalidBindResponse.into());
                }
                let jid_text = el
                    .get_child("bind", ns::BIND)
                    .and_then(|bind| bind.get_child("jid", ns::BIND))
                    .map(|jid| jid.text())
                    .ok_or(ProtocolError::InvalidBindResponse)?;
                return match jid_text.trim().parse::<FullJid>() {
                    Ok(jid) => Ok(Some(jid)),
                    Err(_) => Err(ProtocolError::InvalidBindResponse.into()),
                };
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e),
            None => return Err(Error::Disconnected),
        }
    }
}
