//! Boundary to the external media engine.
//!
//! The core drives the engine through [`MediaEngine`] and
//! [`EngineConnection`] commands. Commands never block: results come back
//! asynchronously through [`EngineEvents`], which re-enters them on the
//! serial task queue in the order the engine reported them.

pub mod loopback;

use std::error;
use std::fmt;

use bytes::Bytes;

use oddity_rtc_protocol::{
    Candidate, Description, DescriptionKind, IceConnectionState, MediaConstraints,
    RtcConfiguration,
};

use crate::media::{DataChannelInit, DataChannelRef, DataChannelState, StreamRef};
use crate::peer::Core;
use crate::runtime::serial::QueueHandle;
use crate::session::ConnectionId;

pub trait MediaEngine: Send + 'static {
    fn create_connection(
        &mut self,
        connection_id: &ConnectionId,
        configuration: &RtcConfiguration,
        constraints: &MediaConstraints,
        events: EngineEvents,
    ) -> Result<Box<dyn EngineConnection>, EngineError>;
}

/// Handle to one connection inside the media engine.
pub trait EngineConnection: Send {
    /// Result arrives as [`EngineEvents::local_description_created`] or
    /// [`EngineEvents::description_create_failed`].
    fn create_description(&mut self, kind: DescriptionKind, constraints: &MediaConstraints);

    /// Result arrives as [`EngineEvents::description_applied`] or
    /// [`EngineEvents::description_apply_failed`] with [`DescriptionSide::Local`].
    fn set_local_description(&mut self, description: &Description);

    /// Result arrives as [`EngineEvents::description_applied`] or
    /// [`EngineEvents::description_apply_failed`] with [`DescriptionSide::Remote`].
    fn set_remote_description(&mut self, description: &Description);

    fn add_ice_candidate(&mut self, candidate: &Candidate);

    fn create_data_channel(
        &mut self,
        label: &str,
        init: &DataChannelInit,
    ) -> Result<DataChannelRef, EngineError>;

    /// Releases the underlying connection. Called at most once.
    fn close(&mut self) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionSide {
    Local,
    Remote,
}

impl fmt::Display for DescriptionSide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DescriptionSide::Local => write!(f, "local"),
            DescriptionSide::Remote => write!(f, "remote"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    LocalDescriptionCreated(Description),
    DescriptionApplied(DescriptionSide),
    DescriptionCreateFailed(String),
    DescriptionApplyFailed(DescriptionSide, String),
    CandidateDiscovered(Candidate),
    IceStatusChanged(IceConnectionState),
    StreamAdded(StreamRef),
    StreamRemoved(StreamRef),
    DataChannelOpened(DataChannelRef),
    DataChannelBufferedAmountChanged(DataChannelRef, u64),
    DataChannelStateChanged(DataChannelRef, DataChannelState),
    DataChannelMessage(DataChannelRef, Bytes, bool),
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::LocalDescriptionCreated(_) => "local description created",
            EngineEvent::DescriptionApplied(_) => "description applied",
            EngineEvent::DescriptionCreateFailed(_) => "description create failed",
            EngineEvent::DescriptionApplyFailed(..) => "description apply failed",
            EngineEvent::CandidateDiscovered(_) => "candidate discovered",
            EngineEvent::IceStatusChanged(_) => "ice status changed",
            EngineEvent::StreamAdded(_) => "stream added",
            EngineEvent::StreamRemoved(_) => "stream removed",
            EngineEvent::DataChannelOpened(_) => "data channel opened",
            EngineEvent::DataChannelBufferedAmountChanged(..) => {
                "data channel buffered amount changed"
            }
            EngineEvent::DataChannelStateChanged(..) => "data channel state changed",
            EngineEvent::DataChannelMessage(..) => "data channel message",
        }
    }
}

/// Callback side of the engine boundary for a single connection. Cheap to
/// clone and safe to use from any thread.
#[derive(Clone)]
pub struct EngineEvents {
    connection_id: ConnectionId,
    queue: QueueHandle<Core>,
}

impl EngineEvents {
    pub(crate) fn new(connection_id: ConnectionId, queue: QueueHandle<Core>) -> Self {
        Self {
            connection_id,
            queue,
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    pub fn local_description_created(&self, description: Description) {
        self.post(EngineEvent::LocalDescriptionCreated(description));
    }

    pub fn description_applied(&self, side: DescriptionSide) {
        self.post(EngineEvent::DescriptionApplied(side));
    }

    pub fn description_create_failed(&self, reason: impl Into<String>) {
        self.post(EngineEvent::DescriptionCreateFailed(reason.into()));
    }

    pub fn description_apply_failed(&self, side: DescriptionSide, reason: impl Into<String>) {
        self.post(EngineEvent::DescriptionApplyFailed(side, reason.into()));
    }

    pub fn candidate_discovered(&self, candidate: Candidate) {
        self.post(EngineEvent::CandidateDiscovered(candidate));
    }

    pub fn ice_status_changed(&self, state: IceConnectionState) {
        self.post(EngineEvent::IceStatusChanged(state));
    }

    pub fn stream_added(&self, stream: StreamRef) {
        self.post(EngineEvent::StreamAdded(stream));
    }

    pub fn stream_removed(&self, stream: StreamRef) {
        self.post(EngineEvent::StreamRemoved(stream));
    }

    pub fn data_channel_opened(&self, channel: DataChannelRef) {
        self.post(EngineEvent::DataChannelOpened(channel));
    }

    pub fn data_channel_buffered_amount_changed(&self, channel: DataChannelRef, amount: u64) {
        self.post(EngineEvent::DataChannelBufferedAmountChanged(channel, amount));
    }

    pub fn data_channel_state_changed(&self, channel: DataChannelRef, state: DataChannelState) {
        self.post(EngineEvent::DataChannelStateChanged(channel, state));
    }

    pub fn data_channel_message(&self, channel: DataChannelRef, buffer: Bytes, binary: bool) {
        self.post(EngineEvent::DataChannelMessage(channel, buffer, binary));
    }

    fn post(&self, event: EngineEvent) {
        let connection_id = self.connection_id.clone();
        let name = event.name();
        if self
            .queue
            .submit(name, move |core| core.on_engine_event(&connection_id, event))
            .is_err()
        {
            tracing::trace!(
                connection_id=%self.connection_id,
                event=name,
                "task queue closed, dropping engine event",
            );
        }
    }
}

impl fmt::Debug for EngineEvents {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EngineEvents")
            .field("connection_id", &self.connection_id)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.message.fmt(f)
    }
}

impl error::Error for EngineError {}
