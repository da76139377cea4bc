// Copyright (c) 2026 XMChat contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! XML namespaces used by the c2s stream.

/// RFC 6120: default namespace of client-to-server streams.
pub const JABBER_CLIENT: &str = "jabber:client";

/// RFC 6120: the `<stream:stream>` wrapper element.
pub const STREAM: &str = "http://etherx.jabber.org/streams";

/// RFC 6120: SASL negotiation elements.
pub const SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";

/// RFC 6120: resource binding.
pub const BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";
