// Copyright (c) 2026 XMChat contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `TcpConnector` provides a plaintext TCP transport

use tokio::{io::BufStream, net::TcpStream};

use crate::config::ResolvedConfig;
use crate::connect::Connector;
use crate::error::Error;

/// Connect via plaintext TCP to an XMPP server.
///
/// This should only be used over localhost or otherwise when you know what
/// you are doing; anything touching the open network wants a TLS-capable
/// [`Connector`] instead.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = BufStream<TcpStream>;

    async fn connect(&self, config: &ResolvedConfig) -> Result<Self::Stream, Error> {
        debug!("connecting to {}:{}", config.hostname, config.port);
        let stream = TcpStream::connect((config.hostname.as_str(), config.port)).await?;
        Ok(BufStream::new(stream))
    }
}
