// Copyright (c) 2026 XMChat contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! One XMPP session: lifecycle of a single authenticated c2s stream.
//!
//! A [`Session`] owns exactly one connection attempt at a time and walks it
//! through `Disconnected → Connecting → Connected → Authenticating →
//! Authenticated`, with `close()` valid from every state and `Failed`
//! recoverable only through a fresh `configure` + `connect` cycle. The UI
//! collaborator drives the session through the methods on [`Session`] and
//! observes it through [`Session::subscribe`].

use std::mem;
use std::sync::{Arc, Mutex as StdMutex};

use jid::{FullJid, Jid};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::{ResolvedConfig, TransportConfig};
use crate::connect::{Connector, TcpConnector};
use crate::error::{Error, FailureReason};
use crate::event::{Event, EventSink, SubscriberId, Subscription};
use crate::message::OutboundMessage;
use crate::xmlstream::XmppStream;

pub(crate) mod auth;
mod worker;


use self::worker::{QueueEntry, StreamWorker, TxState};

// Depth of the transmit queue towards the stream worker.
const QUEUE_DEPTH: usize = 16;

/// Where a session is in its lifecycle.
///
/// Exactly one instance per session; mutated only by the session itself.
/// Transitions are strictly ordered and every change is published as
/// [`Event::StateChanged`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No connection. The initial state, and re-enterable for reconnection.
    Disconnected,
    /// Transport and stream header exchange in progress.
    Connecting,
    /// Stream established, not yet authenticated.
    Connected,
    /// SASL negotiation in progress.
    Authenticating,
    /// Stream authenticated and bound; messages may flow.
    Authenticated,
    /// `close()` is tearing the session down.
    Closing,
    /// The session failed. Recoverable only by `configure` + `connect`.
    Failed(FailureReason),
}

// State, event sink and shutdown signal, shared between the session
// frontend, in-flight operations and the stream worker. This is the part
// that must be readable without taking the operation lock.
pub(crate) struct Shared {
    state_tx: watch::Sender<SessionState>,
    pub(crate) events: EventSink,
    shutdown: StdMutex<CancellationToken>,
    bound_jid: StdMutex<Option<FullJid>>,
    // Keeps StateChanged emission in transition order when close() races
    // the worker.
    transition_lock: StdMutex<()>,
}

impl Shared {
    fn new() -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            state_tx,
            events: EventSink::new(),
            shutdown: StdMutex::new(CancellationToken::new()),
            bound_jid: StdMutex::new(None),
            transition_lock: StdMutex::new(()),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    pub(crate) fn transition(&self, next: SessionState) {
        let _order = self.transition_lock.lock().unwrap();
        let prev = self.state_tx.send_replace(next.clone());
        if prev != next {
            debug!("session state {:?} -> {:?}", prev, next);
            self.events.emit(Event::StateChanged(next));
        }
    }
}

enum Conn<S> {
    /// Nothing live.
    None,
    /// Stream between `connect` and the end of `authenticate`.
    Negotiating(XmppStream<S>),
    /// Stream owned by the worker task.
    Active {
        queue: tokio::sync::mpsc::Sender<QueueEntry>,
        worker: tokio::task::JoinHandle<()>,
    },
}

struct Guts<S> {
    config: Option<ResolvedConfig>,
    conn: Conn<S>,
}

/// An XMPP client session.
///
/// Cheap to clone; clones share the same underlying session. All I/O-bearing
/// operations (`connect`, `authenticate`, `send`) serialize on an internal
/// lock, while `close()` and the observers stay callable at any time.
pub struct Session<C: Connector> {
    connector: C,
    shared: Arc<Shared>,
    guts: Arc<Mutex<Guts<C::Stream>>>,
}

impl<C: Connector + Clone> Clone for Session<C> {
    fn clone(&self) -> Self {
        Self {
            connector: self.connector.clone(),
            shared: Arc::clone(&self.shared),
            guts: Arc::clone(&self.guts),
        }
    }
}

impl Session<TcpConnector> {
    /// A session over plaintext TCP.
    pub fn new_tcp() -> Self {
        Self::new_with_connector(TcpConnector)
    }
}

impl<C: Connector> Session<C> {
    /// Create a session that opens its transports through `connector`.
    pub fn new_with_connector(connector: C) -> Self {
        Self {
            connector,
            shared: Arc::new(Shared::new()),
            guts: Arc::new(Mutex::new(Guts {
                config: None,
                conn: Conn::None,
            })),
        }
    }

    /// Validate and store connection parameters.
    ///
    /// May be called again before `connect` to replace the configuration.
    /// Fails with [`Error::InvalidConfig`] on bad input and with
    /// [`Error::AlreadyConnecting`] while a connect is in flight or a
    /// stream is live.
    pub fn configure(&self, config: TransportConfig) -> Result<(), Error> {
        let resolved = config.validate()?;
        let mut guts = self
            .guts
            .try_lock()
            .map_err(|_| Error::AlreadyConnecting)?;
        match self.shared.state() {
            SessionState::Disconnected | SessionState::Failed(_) => (),
            _ => return Err(Error::AlreadyConnecting),
        }
        debug!("session configured for {}", resolved.jid);
        guts.config = Some(resolved);
        Ok(())
    }

    /// Establish the transport and exchange stream headers.
    ///
    /// `Disconnected → Connecting → Connected`. Cancellable through
    /// `close()`: cancellation unwinds to `Disconnected` and releases the
    /// socket.
    pub async fn connect(&self) -> Result<(), Error> {
        let mut guts = self.guts.lock().await;
        match self.shared.state() {
            SessionState::Disconnected | SessionState::Failed(_) => (),
            _ => return Err(Error::AlreadyConnecting),
        }
        let config = guts.config.clone().ok_or(Error::InvalidState)?;

        // Fresh shutdown token for this connection attempt.
        let shutdown = CancellationToken::new();
        *self.shared.shutdown.lock().unwrap() = shutdown.clone();

        self.shared.transition(SessionState::Connecting);
        let connected = tokio::select! {
            _ = shutdown.cancelled() => None,
            result = async {
                let io = self.connector.connect(&config).await?;
                XmppStream::open(io, &config.domain).await
            } => Some(result),
        };
        match connected {
            // close() may have fired between the transport coming up and us
            // getting scheduled; it always wins.
            Some(Ok(_)) if shutdown.is_cancelled() => {
                self.shared.transition(SessionState::Disconnected);
                Err(Error::Disconnected)
            }
            Some(Ok(stream)) => {
                guts.conn = Conn::Negotiating(stream);
                self.shared.transition(SessionState::Connected);
                Ok(())
            }
            Some(Err(e)) => {
                let reason = FailureReason::from(&e);
                self.shared.events.emit(Event::Error(reason.clone()));
                self.shared.transition(SessionState::Failed(reason));
                Err(e)
            }
            None => {
                // close() won; the in-flight attempt is dropped with it.
                self.shared.transition(SessionState::Disconnected);
                Err(Error::Disconnected)
            }
        }
    }

    /// Authenticate the connected stream and start the receive pump.
    ///
    /// `Connected → Authenticating → Authenticated`. On `AuthError` the
    /// session moves to `Failed` and does not retry.
    pub async fn authenticate(&self) -> Result<(), Error> {
        let mut guts = self.guts.lock().await;
        if self.shared.state() != SessionState::Connected {
            return Err(Error::InvalidState);
        }
        let config = guts.config.clone().ok_or(Error::InvalidState)?;
        let Conn::Negotiating(mut stream) = mem::replace(&mut guts.conn, Conn::None) else {
            return Err(Error::InvalidState);
        };
        let shutdown = self.shared.shutdown.lock().unwrap().clone();

        self.shared.transition(SessionState::Authenticating);
        let result = tokio::select! {
            _ = shutdown.cancelled() => None,
            result = async {
                auth::negotiate(&mut stream, &config).await?;
                stream.restart(&config.domain).await?;
                auth::bind(&mut stream).await
            } => Some(result),
        };
        match result {
            Some(Ok(_)) if shutdown.is_cancelled() => {
                self.shared.transition(SessionState::Disconnected);
                Err(Error::Disconnected)
            }
            Some(Ok(bound)) => {
                if let Some(jid) = &bound {
                    debug!("bound as {}", jid);
                }
                *self.shared.bound_jid.lock().unwrap() = bound;
                let (queue, worker) =
                    StreamWorker::spawn(stream, self.shared.clone(), shutdown, QUEUE_DEPTH);
                guts.conn = Conn::Active { queue, worker };
                self.shared.transition(SessionState::Authenticated);
                Ok(())
            }
            Some(Err(e)) => {
                let reason = FailureReason::from(&e);
                self.shared.events.emit(Event::Error(reason.clone()));
                self.shared.transition(SessionState::Failed(reason));
                Err(e)
            }
            None => {
                self.shared.transition(SessionState::Disconnected);
                Err(Error::Disconnected)
            }
        }
    }

    /// Send a chat message to `to`.
    ///
    /// Resolves once the transport accepted the stanza for delivery (not
    /// once the correspondent acknowledged it) and emits
    /// [`Event::MessageSent`]. Fails fast with [`Error::NotAuthenticated`]
    /// outside the `Authenticated` state; nothing is ever queued for later.
    pub async fn send(&self, to: Jid, body: &str) -> Result<OutboundMessage, Error> {
        if self.shared.state() != SessionState::Authenticated {
            return Err(Error::NotAuthenticated);
        }
        let guts = self.guts.lock().await;
        // The state may have moved while we waited for the lock.
        if self.shared.state() != SessionState::Authenticated {
            return Err(Error::NotAuthenticated);
        }
        let Conn::Active { queue, .. } = &guts.conn else {
            return Err(Error::NotAuthenticated);
        };

        let message = OutboundMessage::new(to, body);
        let (entry, mut token) = QueueEntry::tracked(message.to_stanza());
        queue.send(entry).await.map_err(|_| Error::Disconnected)?;
        match token.wait().await {
            TxState::Sent => {
                self.shared.events.emit(Event::MessageSent(message.clone()));
                Ok(message)
            }
            TxState::Failed { error } => Err(Error::Network(error.to_io_error())),
            TxState::Dropped | TxState::Queued => Err(Error::Disconnected),
        }
    }

    /// Tear the session down.
    ///
    /// Valid from any state; always ends in `Disconnected` and releases the
    /// socket exactly once, also under concurrent calls. Any in-flight
    /// `connect`/`authenticate` observes the cancellation and unwinds.
    pub async fn close(&self) -> Result<(), Error> {
        if self.shared.state() == SessionState::Disconnected {
            return Ok(());
        }
        self.shared.transition(SessionState::Closing);
        let shutdown = self.shared.shutdown.lock().unwrap().clone();
        shutdown.cancel();

        let mut guts = self.guts.lock().await;
        match mem::replace(&mut guts.conn, Conn::None) {
            Conn::None => {}
            Conn::Negotiating(mut stream) => {
                // Stream idle between connect and authenticate: part
                // politely, then drop the socket.
                use futures::SinkExt;
                let farewell = async {
                    let _ = stream.send(crate::xmlstream::Packet::StreamEnd).await;
                    let _ = SinkExt::<crate::xmlstream::Packet>::close(&mut stream).await;
                };
                let _ = tokio::time::timeout(worker::LOCAL_SHUTDOWN_TIMEOUT, farewell).await;
            }
            Conn::Active { queue, worker } => {
                drop(queue);
                let _ = worker.await;
            }
        }
        *self.shared.bound_jid.lock().unwrap() = None;
        self.shared.transition(SessionState::Disconnected);
        Ok(())
    }

    /// Register an event subscriber.
    pub fn subscribe(&self) -> Subscription {
        self.shared.events.subscribe()
    }

    /// Remove an event subscriber. Idempotent.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.shared.events.unsubscribe(id)
    }

    /// The session's current state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// The full JID the server bound this session to, once `Authenticated`.
    pub fn bound_jid(&self) -> Option<FullJid> {
        self.shared.bound_jid.lock().unwrap().clone()
    }
}
