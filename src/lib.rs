// Copyright (c) 2026 XMChat contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Session management core of the XMChat client.
//!
//! This crate owns exactly one thing: the lifecycle of a single
//! authenticated XMPP c2s stream and the one-to-one chat messages flowing
//! over it. Screens, navigation and rendering live elsewhere and talk to
//! this crate through [`Session`] and the events it publishes.
//!
//! # Getting started
//!
//! ```no_run
//! use xmchat_session::{Session, TransportConfig};
//!
//! # async fn run() -> Result<(), xmchat_session::Error> {
//! let session = Session::new_tcp();
//! session.configure(TransportConfig::new("alice", "secret", "x.example", "5222"))?;
//!
//! let mut events = session.subscribe();
//! session.connect().await?;
//! session.authenticate().await?;
//! session.send("bob@x.example".parse().unwrap(), "hi").await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Messages may only be sent while the session is `Authenticated`; there is
//! no offline queue, no automatic reconnect and no retry policy in here —
//! those are caller decisions.

#![deny(unsafe_code, bare_trait_objects)]

#[macro_use]
extern crate log;

pub mod config;
pub mod connect;
pub mod error;
pub mod event;
pub mod message;
mod ns;
pub mod session;
pub mod xmlstream;

pub use config::{ResolvedConfig, TransportConfig};
pub use connect::{Connector, TcpConnector};
pub use error::{
    AuthError, ConfigError, Error, FailureKind, FailureReason, ProtocolError,
};
pub use event::{Event, SubscriberId, Subscription};
pub use message::{InboundMessage, OutboundMessage};
pub use session::{Session, SessionState};

// Re-exports
pub use jid;
pub use jid::{BareJid, FullJid, Jid};
pub use minidom;
