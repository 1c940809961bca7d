use std::error;
use std::fmt;

use crate::engine::{DescriptionSide, EngineError};
use crate::renderer::Slot;
use crate::session::{ConnectionId, SessionState};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// A connection with this identifier is already registered.
    DuplicateConnectionId(ConnectionId),
    /// The engine produced a second local description in the same
    /// negotiation round.
    DuplicateDescription(ConnectionId),
    /// The engine failed to create a local description.
    DescriptionCreateFailed {
        connection_id: ConnectionId,
        reason: String,
    },
    /// The engine failed to apply a local or remote description.
    DescriptionApplyFailed {
        connection_id: ConnectionId,
        side: DescriptionSide,
        reason: String,
    },
    /// A stream that does not have the expected number of tracks. Remote
    /// streams may carry at most one audio and one video track, streams
    /// bound to a renderer exactly one video track.
    MalformedStream {
        stream_id: String,
        video_tracks: usize,
        audio_tracks: usize,
    },
    /// The slot → sink → stream → track chain of a binding is incomplete.
    MissingBinding { slot: Slot, link: &'static str },
    /// The connection was closed (or never existed).
    ConnectionAlreadyClosed(ConnectionId),
    /// The operation is not valid in the current negotiation state.
    InvalidState {
        connection_id: ConnectionId,
        operation: &'static str,
        state: SessionState,
    },
    /// The media engine reported an error.
    Engine(EngineError),
    /// The serial task queue is no longer accepting tasks.
    QueueClosed,
    /// A task that was expected to reply did not (it panicked, or the
    /// queue shut down before it ran).
    TaskAborted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::DuplicateConnectionId(connection_id) => {
                write!(f, "connection already exists: {connection_id}")
            }
            Error::DuplicateDescription(connection_id) => {
                write!(f, "multiple local descriptions created for: {connection_id}")
            }
            Error::DescriptionCreateFailed {
                connection_id,
                reason,
            } => write!(
                f,
                "failed to create description for {connection_id}: {reason}"
            ),
            Error::DescriptionApplyFailed {
                connection_id,
                side,
                reason,
            } => write!(
                f,
                "failed to set {side} description for {connection_id}: {reason}"
            ),
            Error::MalformedStream {
                stream_id,
                video_tracks,
                audio_tracks,
            } => write!(
                f,
                "malformed stream: {stream_id} ({video_tracks} video tracks, {audio_tracks} audio tracks)"
            ),
            Error::MissingBinding { slot, link } => {
                write!(f, "binding for {slot} has no {link}")
            }
            Error::ConnectionAlreadyClosed(connection_id) => {
                write!(f, "connection already closed: {connection_id}")
            }
            Error::InvalidState {
                connection_id,
                operation,
                state,
            } => write!(
                f,
                "cannot {operation} for {connection_id} in state {state}"
            ),
            Error::Engine(err) => write!(f, "media engine error: {err}"),
            Error::QueueClosed => write!(f, "task queue closed"),
            Error::TaskAborted => write!(f, "task aborted before replying"),
        }
    }
}

impl error::Error for Error {}

impl From<EngineError> for Error {
    fn from(error: EngineError) -> Self {
        Error::Engine(error)
    }
}
