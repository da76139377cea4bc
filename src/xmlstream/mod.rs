// Copyright (c) 2026 XMChat contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Framing of a raw byte stream into XMPP stream-level packets.
//!
//! [`XmppStream`] wraps the transport produced by a
//! [`Connector`][`crate::connect::Connector`] and exposes the stream as a
//! `futures` [`Stream`] of [`Packet`]s and a [`Sink`] accepting them. It
//! also owns the `<stream:stream>` header exchange ([`XmppStream::open`],
//! [`XmppStream::restart`]) and keeps the most recently received
//! [`StreamFeatures`].
//!
//! Stanzas are plain [`minidom::Element`]s here; interpreting them is the
//! session's business.

use core::pin::Pin;
use core::task::{Context, Poll};
use std::collections::HashMap;
use std::io;

use bytes::{Buf, BytesMut};
use futures::{ready, Sink, SinkExt, Stream, StreamExt};
use minidom::Element;
use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::error::{Error, ProtocolError};
use crate::ns;

#[cfg(test)]
mod tests;

// If we already have 2 kiB of serialised data waiting in the send buffer,
// do not accept more packets until it drained.
const TX_BUFFER_HIGH_WATER_MARK: usize = 2048;

/// A single frame of the XML stream.
#[derive(Debug)]
pub enum Packet {
    /// A `<stream:stream>` header, with its non-namespace attributes.
    StreamStart(HashMap<String, String>),
    /// A complete top-level element (stanza or nonza).
    Stanza(Element),
    /// Text at stream level, i.e. whitespace keepalives.
    Text(String),
    /// The `</stream:stream>` footer.
    StreamEnd,
}

/// The subset of `<stream:features/>` this client cares about.
#[derive(Debug, Clone, Default)]
pub struct StreamFeatures {
    /// SASL mechanism names advertised by the server.
    pub sasl_mechanisms: Vec<String>,
    /// Whether the server offers resource binding.
    pub can_bind: bool,
}

impl StreamFeatures {
    fn parse(el: &Element) -> Self {
        let sasl_mechanisms = el
            .get_child("mechanisms", ns::SASL)
            .map(|mechs| {
                mechs
                    .children()
                    .filter(|child| child.is("mechanism", ns::SASL))
                    .map(|child| child.text())
                    .collect()
            })
            .unwrap_or_default();
        let can_bind = el.get_child("bind", ns::BIND).is_some();
        Self {
            sasl_mechanisms,
            can_bind,
        }
    }
}

/// Wraps a binary stream to decode and encode XMPP stream packets.
///
/// Implements `Sink + Stream`
pub struct XmppStream<Io> {
    reader: Pin<Box<rxml::AsyncReader<Io>>>,
    tx_buffer: BytesMut,
    // Partially received top-level element, innermost last.
    stack: Vec<Element>,
    /// `<stream:features/>` received during the last header exchange.
    pub features: StreamFeatures,
    /// Stream `id` attribute assigned by the server.
    pub id: String,
}

impl<Io: AsyncBufRead + AsyncWrite + Unpin + Send> XmppStream<Io> {
    /// Wrap an established transport. No I/O happens until the stream is
    /// driven; most callers want [`XmppStream::open`] instead.
    pub fn new(io: Io) -> Self {
        let mut reader = Box::pin(rxml::AsyncReader::wrap(io, rxml::Parser::default()));
        reader.as_mut().parser_pinned().set_text_buffering(true);
        XmppStream {
            reader,
            tx_buffer: BytesMut::new(),
            stack: Vec::new(),
            features: StreamFeatures::default(),
            id: String::new(),
        }
    }

    // A stream restart begins a fresh XML document on the same transport.
    fn reset(&mut self) {
        *self.reader.as_mut().parser_pinned() = rxml::Parser::default();
        self.reader.as_mut().parser_pinned().set_text_buffering(true);
        self.stack.clear();
        self.tx_buffer.clear();
        self.features = StreamFeatures::default();
        self.id.clear();
    }

    /// Open a c2s stream on a fresh transport: send our `<stream:stream>`
    /// header and read the server's header and `<stream:features/>`.
    pub async fn open(io: Io, domain: &str) -> Result<Self, Error> {
        let mut stream = Self::new(io);
        stream.handshake(domain).await?;
        Ok(stream)
    }

    /// Re-run the header exchange on the same transport, as required after
    /// SASL success.
    pub async fn restart(&mut self, domain: &str) -> Result<(), Error> {
        self.reset();
        self.handshake(domain).await
    }

    async fn handshake(&mut self, domain: &str) -> Result<(), Error> {
        let mut attrs = HashMap::new();
        attrs.insert("to".to_owned(), domain.to_owned());
        attrs.insert("version".to_owned(), "1.0".to_owned());
        self.send(Packet::StreamStart(attrs)).await?;

        let header = loop {
            match self.next().await {
                Some(Ok(Packet::StreamStart(attrs))) => break attrs,
                Some(Ok(Packet::Text(_))) => {}
                Some(Ok(Packet::StreamEnd)) | None => return Err(Error::Disconnected),
                Some(Ok(_)) => return Err(ProtocolError::InvalidStreamStart.into()),
                Some(Err(e)) => return Err(e),
            }
        };
        let id = header
            .get("id")
            .cloned()
            .ok_or(ProtocolError::NoStreamId)?;

        let features = loop {
            match self.next().await {
                Some(Ok(Packet::Stanza(el))) if el.is("features", ns::STREAM) => {
                    break StreamFeatures::parse(&el)
                }
                Some(Ok(Packet::Stanza(el))) => {
                    debug!("ignoring pre-features element <{}/>", el.name());
                }
                Some(Ok(Packet::Text(_))) => {}
                Some(Ok(Packet::StreamEnd)) | None => return Err(Error::Disconnected),
                Some(Ok(_)) => return Err(ProtocolError::InvalidStreamStart.into()),
                Some(Err(e)) => return Err(e),
            }
        };

        debug!("stream {} opened to {}", id, domain);
        self.id = id;
        self.features = features;
        Ok(())
    }
}

fn read_error(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::InvalidData {
        Error::Protocol(ProtocolError::Parse(e))
    } else {
        Error::Network(e)
    }
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

/// Decoded XMPP packets
impl<Io: AsyncBufRead> Stream for XmppStream<Io> {
    type Item = Result<Packet, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            let event = match ready!(this.reader.as_mut().poll_read(cx)).transpose() {
                None => return Poll::Ready(None),
                Some(Err(e)) => return Poll::Ready(Some(Err(read_error(e)))),
                Some(Ok(event)) => event,
            };
            match event {
                rxml::Event::XmlDeclaration(_, _) => (),
                rxml::Event::StartElement(_, (elem_ns, name), attrs) => {
                    if this.stack.is_empty() && elem_ns == ns::STREAM && name == "stream" {
                        let mut header = HashMap::new();
                        for ((attr_ns, attr_name), value) in attrs {
                            if attr_ns == *rxml::Namespace::none() {
                                header.insert(attr_name.to_string(), value);
                            }
                        }
                        return Poll::Ready(Some(Ok(Packet::StreamStart(header))));
                    }
                    let mut builder = Element::builder(name.to_string(), elem_ns.to_string());
                    for ((attr_ns, attr_name), value) in attrs {
                        if attr_ns == *rxml::Namespace::none() {
                            builder = builder.attr(attr_name.to_string(), value);
                        } else if attr_ns == *rxml::Namespace::xml() {
                            builder = builder.attr(format!("xml:{}", attr_name), value);
                        } else {
                            debug!(
                                "dropping attribute {{{}}}{} in foreign namespace",
                                attr_ns, attr_name
                            );
                        }
                    }
                    this.stack.push(builder.build());
                }
                rxml::Event::Text(_, text) => match this.stack.last_mut() {
                    Some(el) => el.append_text_node(text),
                    None => return Poll::Ready(Some(Ok(Packet::Text(text)))),
                },
                rxml::Event::EndElement(_) => match this.stack.pop() {
                    Some(el) => match this.stack.last_mut() {
                        Some(parent) => {
                            parent.append_child(el);
                        }
                        None => return Poll::Ready(Some(Ok(Packet::Stanza(el)))),
                    },
                    // The only unclosed element is the stream root itself.
                    None => return Poll::Ready(Some(Ok(Packet::StreamEnd))),
                },
            }
        }
    }
}

impl<Io: AsyncWrite> XmppStream<Io> {
    fn progress_write(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        while !self.tx_buffer.is_empty() {
            let written = match ready!(self
                .reader
                .as_mut()
                .inner_pinned()
                .poll_write(cx, &self.tx_buffer))
            {
                Ok(0) => {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "transport refused writes",
                    )))
                }
                Ok(n) => n,
                Err(e) => return Poll::Ready(Err(e)),
            };
            self.tx_buffer.advance(written);
        }
        Poll::Ready(Ok(()))
    }
}

/// Encoded XMPP packets
impl<Io: AsyncWrite> Sink<Packet> for XmppStream<Io> {
    type Error = Error;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = self.get_mut();
        match this.progress_write(cx) {
            // No write progress, but buffer space may still be fine.
            Poll::Pending => (),
            Poll::Ready(Ok(())) => (),
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e.into())),
        }
        if this.tx_buffer.len() < TX_BUFFER_HIGH_WATER_MARK {
            Poll::Ready(Ok(()))
        } else {
            Poll::Pending
        }
    }

    fn start_send(self: Pin<&mut Self>, item: Packet) -> Result<(), Self::Error> {
        let this = self.get_mut();
        match item {
            Packet::StreamStart(attrs) => {
                let mut head = format!(
                    "<?xml version='1.0'?><stream:stream xmlns='{}' xmlns:stream='{}'",
                    ns::JABBER_CLIENT,
                    ns::STREAM
                );
                for (name, value) in attrs {
                    head.push(' ');
                    head.push_str(&name);
                    head.push_str("='");
                    escape_into(&mut head, &value);
                    head.push('\'');
                }
                head.push('>');
                this.tx_buffer.extend_from_slice(head.as_bytes());
            }
            Packet::Stanza(el) => {
                let xml = String::from(&el);
                trace!("SEND {}", xml);
                this.tx_buffer.extend_from_slice(xml.as_bytes());
            }
            Packet::Text(text) => {
                let mut escaped = String::new();
                escape_into(&mut escaped, &text);
                this.tx_buffer.extend_from_slice(escaped.as_bytes());
            }
            Packet::StreamEnd => {
                this.tx_buffer.extend_from_slice(b"</stream:stream>");
            }
        }
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = self.get_mut();
        ready!(this.progress_write(cx))?;
        this.reader
            .as_mut()
            .inner_pinned()
            .poll_flush(cx)
            .map_err(Error::from)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = self.get_mut();
        ready!(this.progress_write(cx))?;
        this.reader
            .as_mut()
            .inner_pinned()
            .poll_shutdown(cx)
            .map_err(Error::from)
    }
}
