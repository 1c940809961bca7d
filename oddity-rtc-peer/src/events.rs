use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use oddity_rtc_protocol::{Candidate, Description, IceConnectionState};

use crate::media::{DataChannelRef, DataChannelState, StreamRef};
use crate::session::ConnectionId;

/// Events a session reports to its subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    OfferGenerated(Description),
    AnswerGenerated(Description),
    CandidateGenerated(Candidate),
    IceStatusChanged(IceConnectionState),
    RemoteStreamAdded(StreamRef),
    RemoteStreamRemoved(StreamRef),
    ConnectionError(String),
    DataChannelOpened(DataChannelRef),
    DataChannelBufferedAmountChanged {
        channel: DataChannelRef,
        amount: u64,
    },
    DataChannelStateChanged {
        channel: DataChannelRef,
        state: DataChannelState,
    },
    DataChannelMessage {
        channel: DataChannelRef,
        buffer: Bytes,
        binary: bool,
    },
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SessionEvent::OfferGenerated(offer) => write!(f, "offer generated: {offer}"),
            SessionEvent::AnswerGenerated(answer) => write!(f, "answer generated: {answer}"),
            SessionEvent::CandidateGenerated(candidate) => {
                write!(f, "candidate generated: {candidate}")
            }
            SessionEvent::IceStatusChanged(state) => write!(f, "ice status changed: {state}"),
            SessionEvent::RemoteStreamAdded(stream) => {
                write!(f, "remote stream added: {}", stream.id())
            }
            SessionEvent::RemoteStreamRemoved(stream) => {
                write!(f, "remote stream removed: {}", stream.id())
            }
            SessionEvent::ConnectionError(message) => write!(f, "connection error: {message}"),
            SessionEvent::DataChannelOpened(channel) => {
                write!(f, "data channel opened: {}", channel.label())
            }
            SessionEvent::DataChannelBufferedAmountChanged { channel, amount } => write!(
                f,
                "data channel {} buffered amount: {amount}",
                channel.label()
            ),
            SessionEvent::DataChannelStateChanged { channel, state } => {
                write!(f, "data channel {} state: {state}", channel.label())
            }
            SessionEvent::DataChannelMessage { channel, buffer, .. } => write!(
                f,
                "data channel {} message ({} bytes)",
                channel.label(),
                buffer.len()
            ),
        }
    }
}

pub trait Subscriber: Send + Sync {
    fn on_event(&self, connection_id: &ConnectionId, event: &SessionEvent);
}

pub type SubscriberRef = Arc<dyn Subscriber>;

#[derive(Debug, Clone)]
pub struct Notification {
    pub connection_id: ConnectionId,
    pub event: SessionEvent,
}

pub type NotificationTx = mpsc::UnboundedSender<Notification>;
pub type EventStream = UnboundedReceiverStream<Notification>;

impl Subscriber for NotificationTx {
    fn on_event(&self, connection_id: &ConnectionId, event: &SessionEvent) {
        let _ = self.send(Notification {
            connection_id: connection_id.clone(),
            event: event.clone(),
        });
    }
}

/// Ordered subscriber list of one session. Registration is append-only and
/// dispatch iterates over a snapshot, so a subscriber registered while an
/// event is being dispatched only sees later events.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<SubscriberRef>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, subscriber: SubscriberRef) {
        self.subscribers.push(subscriber);
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn dispatch(&self, connection_id: &ConnectionId, event: SessionEvent) {
        tracing::trace!(%connection_id, %event, subscribers=self.subscribers.len(), "dispatching");
        let snapshot = self.subscribers.clone();
        for (index, subscriber) in snapshot.iter().enumerate() {
            // One misbehaving subscriber must not keep the event from the
            // ones registered after it.
            if panic::catch_unwind(AssertUnwindSafe(|| {
                subscriber.on_event(connection_id, &event)
            }))
            .is_err()
            {
                tracing::error!(%connection_id, subscriber=index, "subscriber panicked");
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Subscriber channel paired with the stream that receives from it.
pub fn channel() -> (NotificationTx, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, UnboundedReceiverStream::new(rx))
}
