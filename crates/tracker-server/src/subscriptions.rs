//! SSE Subscriptions - bridges the broadcast hub to event-stream responses
//!
//! Each connected observer gets a bounded queue. The hub pushes into it with
//! `try_send`, the HTTP response drains it. Dropping the response (client
//! went away) unsubscribes the observer.

use axum::response::sse::Event;
use futures::Stream;
use std::{
    convert::Infallible,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracker_core::{DeliveryError, Snapshot, Subscriber, SubscriberId, Tracker};

/// Hub-side half of an SSE connection
pub struct SseSubscriber {
    sender: mpsc::Sender<Event>,
}

impl SseSubscriber {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    fn push(&self, event: Event) -> Result<(), DeliveryError> {
        self.sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

impl Subscriber for SseSubscriber {
    fn setup(&mut self) -> Result<(), DeliveryError> {
        self.push(Event::default().comment("connected"))
    }

    fn send(&mut self, snapshot: &Snapshot) -> Result<(), DeliveryError> {
        let event = Event::default()
            .json_data(snapshot)
            .map_err(|e| DeliveryError::Encode(e.to_string()))?;
        self.push(event)
    }
}

/// Response-side half of an SSE connection
pub struct SnapshotStream {
    receiver: mpsc::Receiver<Event>,
    tracker: Arc<Tracker>,
    subscriber_id: SubscriberId,
}

impl SnapshotStream {
    /// Subscribe a new observer and return the stream feeding its response
    pub fn open(tracker: &Arc<Tracker>, buffer: usize) -> Result<Self, DeliveryError> {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let subscriber_id = tracker.subscribe(Box::new(SseSubscriber::new(sender)))?;

        tracing::debug!("SSE observer {} connected", subscriber_id);

        Ok(Self {
            receiver,
            tracker: tracker.clone(),
            subscriber_id,
        })
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }
}

impl Stream for SnapshotStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx).map(|event| event.map(Ok))
    }
}

impl Drop for SnapshotStream {
    fn drop(&mut self) {
        if self.tracker.unsubscribe(self.subscriber_id) {
            tracing::debug!("SSE observer {} disconnected", self.subscriber_id);
        }
    }
}
