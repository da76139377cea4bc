// Copyright (c) 2026 XMChat contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Events delivered to the UI collaborator, and the subscriber registry
//! behind [`Session::subscribe`].
//!
//! [`Session::subscribe`]: crate::Session::subscribe

use core::pin::Pin;
use core::task::{Context, Poll};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::FailureReason;
use crate::message::{InboundMessage, OutboundMessage};
use crate::session::SessionState;

/// Session and message events, in the order they occurred.
#[derive(Debug, Clone)]
pub enum Event {
    /// The session state machine moved to a new state.
    StateChanged(SessionState),
    /// A message was accepted by the transport for delivery.
    MessageSent(OutboundMessage),
    /// A chat message arrived on the stream.
    MessageReceived(InboundMessage),
    /// The session failed; carries the flattened cause.
    Error(FailureReason),
}

/// Identifies one subscriber for [`Session::unsubscribe`].
///
/// [`Session::unsubscribe`]: crate::Session::unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// A live event subscription.
///
/// Implements [`futures::Stream`]; events are delivered in the order they
/// were emitted. Dropping the subscription detaches it (the registry prunes
/// dead subscribers on the next emission).
pub struct Subscription {
    id: SubscriberId,
    rx: UnboundedReceiverStream<Event>,
}

impl Subscription {
    /// The id to pass to [`Session::unsubscribe`].
    ///
    /// [`Session::unsubscribe`]: crate::Session::unsubscribe
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event. `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.next().await
    }
}

impl Stream for Subscription {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().rx).poll_next(cx)
    }
}

/// Fan-out registry decoupling session internals from UI consumers.
///
/// Each subscriber gets its own unbounded channel, so ordering is strict per
/// subscriber while independent subscribers are free to drain at their own
/// pace.
pub(crate) struct EventSink {
    subscribers: Mutex<Vec<(SubscriberId, mpsc::UnboundedSender<Event>)>>,
    next_id: AtomicU64,
}

impl EventSink {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().unwrap().push((id, tx));
        Subscription {
            id,
            rx: UnboundedReceiverStream::new(rx),
        }
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.lock().unwrap().retain(|(sid, _)| *sid != id);
    }

    pub fn emit(&self, event: Event) {
        let mut subscribers = self.subscribers.lock().unwrap();
        // Sending also prunes subscribers whose Subscription was dropped.
        subscribers.retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;

    #[tokio::test]
    async fn per_subscriber_order_is_emission_order() {
        let sink = EventSink::new();
        let mut sub = sink.subscribe();
        sink.emit(Event::StateChanged(SessionState::Connecting));
        sink.emit(Event::StateChanged(SessionState::Connected));
        assert!(matches!(
            sub.recv().await,
            Some(Event::StateChanged(SessionState::Connecting))
        ));
        assert!(matches!(
            sub.recv().await,
            Some(Event::StateChanged(SessionState::Connected))
        ));
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let sink = EventSink::new();
        let mut sub = sink.subscribe();
        let id = sub.id();
        sink.unsubscribe(id);
        sink.unsubscribe(id);
        sink.emit(Event::StateChanged(SessionState::Connecting));
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_subscription_does_not_block_others() {
        let sink = EventSink::new();
        let dead = sink.subscribe();
        let mut live = sink.subscribe();
        drop(dead);
        sink.emit(Event::StateChanged(SessionState::Connecting));
        assert!(live.recv().await.is_some());
    }
}
