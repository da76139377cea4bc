// Copyright (c) 2026 XMChat contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `Connector` provides transports for XMPP sessions

use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::config::ResolvedConfig;
use crate::error::Error;

mod tcp;
pub use tcp::TcpConnector;

/// trait for the byte streams produced by a Connector
pub trait AsyncReadAndWrite: AsyncBufRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncBufRead + AsyncWrite + Unpin + Send> AsyncReadAndWrite for T {}

/// Trait called to open the transport for a session, perhaps called multiple
/// times over the life of a [`Session`].
///
/// The connector only establishes the byte stream (TCP, TLS, in-memory for
/// tests); stream headers, SASL and everything above is the session's
/// business. Implementations for TLS or DNS-SRV resolution plug in here
/// without the session noticing.
///
/// [`Session`]: crate::Session
pub trait Connector: Clone + core::fmt::Debug + Send + Sync + Unpin + 'static {
    /// The type of stream this Connector produces
    type Stream: AsyncReadAndWrite + 'static;

    /// Open a fresh transport to the server named by `config`.
    fn connect(
        &self,
        config: &ResolvedConfig,
    ) -> impl core::future::Future<Output = Result<Self::Stream, Error>> + Send;
}
