// Copyright (c) 2026 XMChat contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufStream, DuplexStream};

use super::*;

const SERVER_HEADER: &str = "<?xml version='1.0'?><stream:stream \
     xmlns='jabber:client' xmlns:stream='http://etherx.jabber.org/streams' \
     id='srv-1' from='x.example' version='1.0'>";

fn pair() -> (BufStream<DuplexStream>, DuplexStream) {
    let (client, server) = tokio::io::duplex(65536);
    (BufStream::new(client), server)
}

async fn read_until(server: &mut DuplexStream, needle: &str) -> String {
    let mut buf = Vec::new();
    loop {
        let mut chunk = [0u8; 4096];
        let n = server.read(&mut chunk).await.expect("server read");
        assert!(
            n > 0,
            "eof while waiting for {:?}, got {:?}",
            needle,
            String::from_utf8_lossy(&buf)
        );
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8(buf.clone()).expect("captured utf8");
        if text.contains(needle) {
            return text;
        }
    }
}

/// Open a negotiated stream against a scripted server half.
async fn opened(features: &'static str) -> (XmppStream<BufStream<DuplexStream>>, DuplexStream) {
    let (client, mut server) = pair();
    let open = tokio::spawn(async move { XmppStream::open(client, "x.example").await });
    read_until(&mut server, ">").await;
    server.write_all(SERVER_HEADER.as_bytes()).await.unwrap();
    server.write_all(features.as_bytes()).await.unwrap();
    let stream = open.await.unwrap().expect("open");
    (stream, server)
}

#[tokio::test]
async fn open_negotiates_header_and_features() {
    let (stream, _server) = opened(
        "<stream:features>\
         <mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
         <mechanism>PLAIN</mechanism><mechanism>SCRAM-SHA-1</mechanism>\
         </mechanisms>\
         <bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/>\
         </stream:features>",
    )
    .await;
    assert_eq!(stream.id, "srv-1");
    assert_eq!(stream.features.sasl_mechanisms, ["PLAIN", "SCRAM-SHA-1"]);
    assert!(stream.features.can_bind);
}

#[tokio::test]
async fn open_requires_stream_id() {
    let (client, mut server) = pair();
    let open = tokio::spawn(async move { XmppStream::open(client, "x.example").await });
    read_until(&mut server, ">").await;
    server
        .write_all(
            "<?xml version='1.0'?><stream:stream \
             xmlns='jabber:client' xmlns:stream='http://etherx.jabber.org/streams' \
             from='x.example' version='1.0'>"
                .as_bytes(),
        )
        .await
        .unwrap();
    match open.await.unwrap() {
        Err(Error::Protocol(ProtocolError::NoStreamId)) => (),
        Err(other) => panic!("unexpected error: {:?}", other),
        Ok(_) => panic!("open accepted a header without id"),
    }
}

#[tokio::test]
async fn stanza_roundtrip() {
    let (mut stream, mut server) = opened("<stream:features/>").await;

    let msg: Element = "<message xmlns='jabber:client' to='b@x.example' type='chat'>\
                        <body>hi &amp; bye</body></message>"
        .parse()
        .unwrap();
    stream.send(Packet::Stanza(msg)).await.unwrap();
    let wire = read_until(&mut server, "</message>").await;
    assert!(wire.contains("b@x.example"), "{}", wire);
    assert!(wire.contains("hi &amp; bye"), "{}", wire);

    server
        .write_all(b"<message from='b@x.example' type='chat'><body>yo</body></message>")
        .await
        .unwrap();
    match stream.next().await {
        Some(Ok(Packet::Stanza(el))) => {
            assert!(el.is("message", ns::JABBER_CLIENT));
            assert_eq!(el.attr("from"), Some("b@x.example"));
            assert_eq!(
                el.get_child("body", ns::JABBER_CLIENT).unwrap().text(),
                "yo"
            );
        }
        other => panic!("unexpected packet: {:?}", other),
    }
}

#[tokio::test]
async fn nested_children_are_rebuilt() {
    let (mut stream, mut server) = opened("<stream:features/>").await;
    server
        .write_all(
            b"<iq type='result' id='x'>\
              <bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'><jid>a@x.example/r</jid></bind>\
              </iq>",
        )
        .await
        .unwrap();
    match stream.next().await {
        Some(Ok(Packet::Stanza(el))) => {
            let jid = el
                .get_child("bind", ns::BIND)
                .and_then(|bind| bind.get_child("jid", ns::BIND))
                .expect("nested child");
            assert_eq!(jid.text(), "a@x.example/r");
        }
        other => panic!("unexpected packet: {:?}", other),
    }
}

#[tokio::test]
async fn keepalive_and_footer() {
    let (mut stream, mut server) = opened("<stream:features/>").await;
    server
        .write_all(b" <message from='b@x.example' type='chat'><body>yo</body></message>")
        .await
        .unwrap();
    match stream.next().await {
        Some(Ok(Packet::Text(text))) => assert_eq!(text, " "),
        other => panic!("unexpected packet: {:?}", other),
    }
    assert!(matches!(stream.next().await, Some(Ok(Packet::Stanza(_)))));

    server.write_all(b"</stream:stream>").await.unwrap();
    server.shutdown().await.unwrap();
    assert!(matches!(stream.next().await, Some(Ok(Packet::StreamEnd))));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn malformed_xml_surfaces_as_error() {
    let (mut stream, mut server) = opened("<stream:features/>").await;
    server.write_all(b"<mes sage<<").await.unwrap();
    loop {
        match stream.next().await {
            Some(Err(_)) => break,
            Some(Ok(packet)) => panic!("unexpected packet: {:?}", packet),
            None => panic!("stream ended without surfacing the parse error"),
        }
    }
}
