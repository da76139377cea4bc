// Copyright (c) 2026 XMChat contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Background worker owning the stream for the `Authenticated` phase of a
//! session.
//!
//! The worker is the only task touching the socket once authentication is
//! done: it drains the session's transmit queue into the stream and feeds
//! every received stanza to the message router. It ends on `close()`
//! (cancellation token / queue closure), on peer shutdown, or on stream
//! error, and reports the final state transition itself.

use core::time::Duration;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use minidom::Element;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::connect::AsyncReadAndWrite;
use crate::error::FailureReason;
use crate::event::Event;
use crate::message;
use crate::session::{Shared, SessionState};
use crate::xmlstream::{Packet, XmppStream};

// Allow this long for the closing handshake before dropping the socket.
pub(super) static LOCAL_SHUTDOWN_TIMEOUT: Duration = Duration::new(5, 0);

/// State of a stanza in transit to the peer.
#[derive(Debug, Clone)]
pub(crate) enum TxState {
    /// Enqueued locally, not written yet.
    Queued,
    /// Serialised and flushed into the transport.
    Sent,
    /// The write failed; the session is going down.
    Failed {
        /// The error which caused the sending to fail.
        error: FailureReason,
    },
    /// Dropped from the queue before it could be sent.
    Dropped,
}

pub(crate) struct QueueEntry {
    pub stanza: Element,
    pub token: watch::Sender<TxState>,
}

impl QueueEntry {
    pub fn tracked(stanza: Element) -> (Self, TxToken) {
        let (tx, rx) = watch::channel(TxState::Queued);
        (QueueEntry { stanza, token: tx }, TxToken { inner: rx })
    }
}

/// Tracks one stanza through the transmit queue.
pub(crate) struct TxToken {
    inner: watch::Receiver<TxState>,
}

impl TxToken {
    /// Wait until the stanza left the `Queued` state.
    pub async fn wait(&mut self) -> TxState {
        match self
            .inner
            .wait_for(|state| !matches!(state, TxState::Queued))
            .await
        {
            Ok(state) => state.clone(),
            // Sender gone without a verdict: the worker died with the entry.
            Err(_) => TxState::Dropped,
        }
    }
}

pub(crate) struct StreamWorker<Io> {
    stream: XmppStream<Io>,
    queue: mpsc::Receiver<QueueEntry>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
}

impl<Io: AsyncReadAndWrite + 'static> StreamWorker<Io> {
    /// Spawn the worker task; returns the transmit queue handle and the
    /// join handle `close()` uses to await teardown.
    pub fn spawn(
        stream: XmppStream<Io>,
        shared: Arc<Shared>,
        shutdown: CancellationToken,
        queue_depth: usize,
    ) -> (mpsc::Sender<QueueEntry>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_depth);
        let worker = StreamWorker {
            stream,
            queue: rx,
            shared,
            shutdown,
        };
        let handle = tokio::spawn(worker.run());
        (tx, handle)
    }

    async fn run(mut self) {
        let failure = loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break None,
                entry = self.queue.recv() => match entry {
                    // Session frontend gone; shut down cleanly.
                    None => break None,
                    Some(QueueEntry { stanza, token }) => {
                        let send = tokio::select! {
                            result = self.stream.send(Packet::Stanza(stanza)) => Some(result),
                            _ = self.shutdown.cancelled() => None,
                        };
                        match send {
                            Some(Ok(())) => {
                                token.send_replace(TxState::Sent);
                            }
                            Some(Err(e)) => {
                                let reason = FailureReason::from(&e);
                                token.send_replace(TxState::Failed {
                                    error: reason.clone(),
                                });
                                break Some(reason);
                            }
                            None => {
                                token.send_replace(TxState::Dropped);
                                break None;
                            }
                        }
                    }
                },
                packet = self.stream.next() => match packet {
                    Some(Ok(Packet::Stanza(stanza))) => self.handle_stanza(stanza),
                    // Whitespace keepalive between stanzas.
                    Some(Ok(Packet::Text(_))) => {}
                    Some(Ok(Packet::StreamStart(_))) => {
                        warn!("peer restarted the stream mid-session");
                        break Some(FailureReason::disconnected());
                    }
                    Some(Ok(Packet::StreamEnd)) | None => {
                        debug!("peer closed the stream");
                        break Some(FailureReason::disconnected());
                    }
                    Some(Err(e)) => break Some(FailureReason::from(&e)),
                },
            }
        };

        // Fail everything still queued; future sends are refused by the
        // session state check.
        self.queue.close();
        while let Ok(entry) = self.queue.try_recv() {
            entry.token.send_replace(TxState::Dropped);
        }

        if failure.is_none() {
            // Orderly local shutdown: footer, then give the peer a moment
            // to mirror it.
            let farewell = async {
                let _ = self.stream.send(Packet::StreamEnd).await;
                loop {
                    match self.stream.next().await {
                        Some(Ok(Packet::StreamEnd)) | None => break,
                        Some(Ok(other)) => {
                            trace!("discarding {:?} during shutdown", other);
                        }
                        Some(Err(_)) => break,
                    }
                }
            };
            if tokio::time::timeout(LOCAL_SHUTDOWN_TIMEOUT, farewell)
                .await
                .is_err()
            {
                debug!("giving up on clean stream shutdown after timeout");
            }
        }
        let _ = SinkExt::<Packet>::close(&mut self.stream).await;

        match failure {
            Some(reason) => {
                self.shared.events.emit(Event::Error(reason.clone()));
                self.shared.transition(SessionState::Failed(reason));
            }
            None => self.shared.transition(SessionState::Disconnected),
        }
    }

    fn handle_stanza(&self, stanza: Element) {
        if let Some(msg) = message::parse_chat(&stanza) {
            self.shared.events.emit(Event::MessageReceived(msg));
        }
    }
}
