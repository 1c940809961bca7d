mod candidate_queue;

pub mod connection_registry;

use std::collections::HashMap;
use std::fmt;

use oddity_rtc_protocol::{Candidate, Description, DescriptionKind, MediaConstraints};

use crate::engine::{DescriptionSide, EngineConnection, EngineError, EngineEvent};
use crate::error::Error;
use crate::events::{EventBus, SessionEvent, SubscriberRef};
use crate::media::{DataChannelInit, DataChannelRef, MediaStream};

pub use candidate_queue::CandidateQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    /// Local description created, waiting for the engine to apply it.
    OfferRequested,
    LocalDescriptionSet,
    /// Offer sent out, waiting for the remote answer.
    AwaitingRemote,
    Negotiated,
    Failed,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SessionState::New => write!(f, "new"),
            SessionState::OfferRequested => write!(f, "offer requested"),
            SessionState::LocalDescriptionSet => write!(f, "local description set"),
            SessionState::AwaitingRemote => write!(f, "awaiting remote"),
            SessionState::Negotiated => write!(f, "negotiated"),
            SessionState::Failed => write!(f, "failed"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RemoteDescription {
    Unset,
    Pending(Description),
    Applied(Description),
}

/// Signaling state of one connection to a remote party.
///
/// Every method is expected to run on the serial task queue; the session
/// itself does no synchronization.
pub struct Session {
    id: ConnectionId,
    is_screenshare: bool,
    role: Role,
    state: SessionState,
    creating: Option<DescriptionKind>,
    local_description: Option<Description>,
    remote_description: RemoteDescription,
    candidates: CandidateQueue,
    data_channels: HashMap<String, DataChannelRef>,
    events: EventBus,
    connection: Option<Box<dyn EngineConnection>>,
}

impl Session {
    pub fn new(
        id: ConnectionId,
        is_screenshare: bool,
        connection: Box<dyn EngineConnection>,
    ) -> Self {
        Self {
            id,
            is_screenshare,
            role: Role::Responder,
            state: SessionState::New,
            creating: None,
            local_description: None,
            remote_description: RemoteDescription::Unset,
            candidates: CandidateQueue::new(),
            data_channels: HashMap::new(),
            events: EventBus::new(),
            connection: Some(connection),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_screenshare(&self) -> bool {
        self.is_screenshare
    }

    pub fn local_description(&self) -> Option<&Description> {
        self.local_description.as_ref()
    }

    pub fn queued_candidates(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_none()
    }

    pub fn add_subscriber(&mut self, subscriber: SubscriberRef) {
        self.events.register(subscriber);
    }

    pub fn request_offer(&mut self, constraints: &MediaConstraints) -> Result<(), Error> {
        self.ensure_open()?;
        if self.state != SessionState::New
            || self.role == Role::Initiator
            || self.creating.is_some()
        {
            return Err(self.invalid_state("request offer"));
        }

        tracing::debug!(connection_id=%self.id, "creating offer");
        self.role = Role::Initiator;
        self.creating = Some(DescriptionKind::Offer);
        self.engine()?
            .create_description(DescriptionKind::Offer, constraints);
        Ok(())
    }

    pub fn request_answer(&mut self, constraints: &MediaConstraints) -> Result<(), Error> {
        self.ensure_open()?;
        let remote_applied = matches!(self.remote_description, RemoteDescription::Applied(_));
        if !remote_applied
            || self.role == Role::Initiator
            || self.local_description.is_some()
            || self.creating.is_some()
            || self.state == SessionState::Failed
        {
            return Err(self.invalid_state("request answer"));
        }

        tracing::debug!(connection_id=%self.id, "creating answer");
        self.role = Role::Responder;
        self.creating = Some(DescriptionKind::Answer);
        self.engine()?
            .create_description(DescriptionKind::Answer, constraints);
        Ok(())
    }

    pub fn apply_remote_description(&mut self, description: Description) -> Result<(), Error> {
        self.ensure_open()?;
        tracing::debug!(connection_id=%self.id, %description, "setting remote description");
        self.engine()?.set_remote_description(&description);
        self.remote_description = RemoteDescription::Pending(description);
        Ok(())
    }

    pub fn add_remote_candidate(&mut self, candidate: Candidate) -> Result<(), Error> {
        self.ensure_open()?;
        match self.candidates.admit(candidate) {
            Some(candidate) => {
                tracing::trace!(connection_id=%self.id, %candidate, "adding remote candidate");
                self.engine()?.add_ice_candidate(&candidate);
            }
            None => {
                tracing::trace!(
                    connection_id=%self.id,
                    queued=self.candidates.len(),
                    "queued remote candidate",
                );
            }
        }
        Ok(())
    }

    pub fn create_data_channel(
        &mut self,
        label: &str,
        init: &DataChannelInit,
    ) -> Result<DataChannelRef, Error> {
        self.ensure_open()?;
        match self.engine()?.create_data_channel(label, init) {
            Ok(channel) => {
                tracing::info!(connection_id=%self.id, label, "created data channel");
                self.data_channels.insert(label.to_string(), channel.clone());
                Ok(channel)
            }
            Err(err) => {
                tracing::error!(connection_id=%self.id, label, %err, "failed to create data channel");
                self.events.dispatch(
                    &self.id,
                    SessionEvent::ConnectionError(format!(
                        "failed to create data channel {label}: {err}"
                    )),
                );
                Err(Error::Engine(err))
            }
        }
    }

    pub fn data_channel(&self, label: &str) -> Option<DataChannelRef> {
        self.data_channels.get(label).cloned()
    }

    pub fn data_channel_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.data_channels.keys().cloned().collect();
        labels.sort();
        labels
    }

    /// Releases the engine connection. Closing an already closed session
    /// does nothing.
    pub fn close(&mut self) -> Result<(), EngineError> {
        match self.connection.take() {
            Some(mut connection) => {
                tracing::debug!(connection_id=%self.id, "closing connection");
                self.state = SessionState::Closed;
                self.data_channels.clear();
                connection.close()
            }
            None => {
                tracing::trace!(connection_id=%self.id, "connection already closed");
                Ok(())
            }
        }
    }

    pub fn on_engine_event(&mut self, event: EngineEvent) -> Result<(), Error> {
        self.ensure_open()?;
        match event {
            EngineEvent::LocalDescriptionCreated(description) => {
                self.on_local_description_created(description)
            }
            EngineEvent::DescriptionApplied(side) => self.on_description_applied(side),
            EngineEvent::DescriptionCreateFailed(reason) => {
                self.creating = None;
                self.fail(Error::DescriptionCreateFailed {
                    connection_id: self.id.clone(),
                    reason,
                });
                Ok(())
            }
            EngineEvent::DescriptionApplyFailed(side, reason) => {
                self.fail(Error::DescriptionApplyFailed {
                    connection_id: self.id.clone(),
                    side,
                    reason,
                });
                Ok(())
            }
            EngineEvent::CandidateDiscovered(candidate) => {
                self.events
                    .dispatch(&self.id, SessionEvent::CandidateGenerated(candidate));
                Ok(())
            }
            EngineEvent::IceStatusChanged(state) => {
                tracing::debug!(connection_id=%self.id, %state, "ice connection state changed");
                self.events
                    .dispatch(&self.id, SessionEvent::IceStatusChanged(state));
                Ok(())
            }
            EngineEvent::StreamAdded(stream) => {
                if let Err(err) = check_remote_stream(stream.as_ref()) {
                    tracing::warn!(connection_id=%self.id, %err, "remote stream not added");
                    self.events
                        .dispatch(&self.id, SessionEvent::ConnectionError(err.to_string()));
                } else {
                    tracing::info!(connection_id=%self.id, stream_id=stream.id(), "remote stream added");
                    self.events
                        .dispatch(&self.id, SessionEvent::RemoteStreamAdded(stream));
                }
                Ok(())
            }
            EngineEvent::StreamRemoved(stream) => {
                if let Err(err) = check_remote_stream(stream.as_ref()) {
                    tracing::warn!(connection_id=%self.id, %err, "remote stream not removed");
                    self.events
                        .dispatch(&self.id, SessionEvent::ConnectionError(err.to_string()));
                } else {
                    tracing::info!(connection_id=%self.id, stream_id=stream.id(), "remote stream removed");
                    self.events
                        .dispatch(&self.id, SessionEvent::RemoteStreamRemoved(stream));
                }
                Ok(())
            }
            EngineEvent::DataChannelOpened(channel) => {
                tracing::info!(connection_id=%self.id, label=channel.label(), "peer opened data channel");
                self.events
                    .dispatch(&self.id, SessionEvent::DataChannelOpened(channel));
                Ok(())
            }
            EngineEvent::DataChannelBufferedAmountChanged(channel, amount) => {
                self.events.dispatch(
                    &self.id,
                    SessionEvent::DataChannelBufferedAmountChanged { channel, amount },
                );
                Ok(())
            }
            EngineEvent::DataChannelStateChanged(channel, state) => {
                self.events.dispatch(
                    &self.id,
                    SessionEvent::DataChannelStateChanged { channel, state },
                );
                Ok(())
            }
            EngineEvent::DataChannelMessage(channel, buffer, binary) => {
                self.events.dispatch(
                    &self.id,
                    SessionEvent::DataChannelMessage {
                        channel,
                        buffer,
                        binary,
                    },
                );
                Ok(())
            }
        }
    }

    fn on_local_description_created(&mut self, description: Description) -> Result<(), Error> {
        self.creating = None;
        if self.local_description.is_some() {
            let err = Error::DuplicateDescription(self.id.clone());
            self.events
                .dispatch(&self.id, SessionEvent::ConnectionError(err.to_string()));
            return Err(err);
        }
        if self.state == SessionState::Failed {
            tracing::warn!(connection_id=%self.id, "session failed, not setting local description");
            return Ok(());
        }

        tracing::debug!(connection_id=%self.id, %description, "setting local description");
        self.local_description = Some(description.clone());
        self.transition(SessionState::OfferRequested);
        self.engine()?.set_local_description(&description);
        Ok(())
    }

    fn on_description_applied(&mut self, side: DescriptionSide) -> Result<(), Error> {
        if self.state == SessionState::Failed {
            tracing::warn!(connection_id=%self.id, %side, "session failed, ignoring applied description");
            return Ok(());
        }

        match side {
            DescriptionSide::Local => {
                self.transition(SessionState::LocalDescriptionSet);
                let remote_applied =
                    matches!(self.remote_description, RemoteDescription::Applied(_));
                match (self.role, self.local_description.clone()) {
                    (Role::Initiator, Some(offer)) => {
                        if remote_applied {
                            tracing::debug!(connection_id=%self.id, "remote description already set");
                            self.negotiated()?;
                        } else {
                            tracing::debug!(connection_id=%self.id, "local description set, notifying subscribers");
                            self.transition(SessionState::AwaitingRemote);
                            self.events
                                .dispatch(&self.id, SessionEvent::OfferGenerated(offer));
                        }
                    }
                    (Role::Responder, Some(answer)) => {
                        tracing::debug!(connection_id=%self.id, "local answer set, notifying subscribers");
                        self.events
                            .dispatch(&self.id, SessionEvent::AnswerGenerated(answer));
                        self.negotiated()?;
                    }
                    (_, None) => {
                        tracing::debug!(connection_id=%self.id, "no local description yet, waiting");
                    }
                }
            }
            DescriptionSide::Remote => {
                let remote = std::mem::replace(
                    &mut self.remote_description,
                    RemoteDescription::Unset,
                );
                self.remote_description = match remote {
                    RemoteDescription::Pending(description)
                    | RemoteDescription::Applied(description) => {
                        RemoteDescription::Applied(description)
                    }
                    RemoteDescription::Unset => {
                        tracing::warn!(connection_id=%self.id, "engine applied a remote description that was never set");
                        return Ok(());
                    }
                };

                match self.state {
                    SessionState::LocalDescriptionSet | SessionState::AwaitingRemote => {
                        tracing::debug!(connection_id=%self.id, "remote description set, draining candidates");
                        self.negotiated()?;
                    }
                    _ => {
                        tracing::debug!(connection_id=%self.id, state=%self.state, "remote description set, waiting for local side");
                    }
                }
            }
        }
        Ok(())
    }

    fn negotiated(&mut self) -> Result<(), Error> {
        self.transition(SessionState::Negotiated);
        let queued = self.candidates.drain();
        tracing::debug!(connection_id=%self.id, count=queued.len(), "adding queued remote candidates");
        let connection = self.engine()?;
        for candidate in &queued {
            connection.add_ice_candidate(candidate);
        }
        tracing::info!(connection_id=%self.id, "session negotiated");
        Ok(())
    }

    fn fail(&mut self, err: Error) {
        tracing::error!(connection_id=%self.id, %err, "negotiation failed");
        self.transition(SessionState::Failed);
        self.events
            .dispatch(&self.id, SessionEvent::ConnectionError(err.to_string()));
    }

    fn transition(&mut self, next: SessionState) {
        if self.state == SessionState::Failed && next != SessionState::Closed {
            tracing::warn!(connection_id=%self.id, %next, "session failed, not transitioning");
            return;
        }
        tracing::trace!(connection_id=%self.id, from=%self.state, to=%next, "transition");
        self.state = next;
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.connection.is_some() {
            Ok(())
        } else {
            Err(Error::ConnectionAlreadyClosed(self.id.clone()))
        }
    }

    fn engine(&mut self) -> Result<&mut dyn EngineConnection, Error> {
        match self.connection.as_deref_mut() {
            Some(connection) => Ok(connection),
            None => Err(Error::ConnectionAlreadyClosed(self.id.clone())),
        }
    }

    fn invalid_state(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            connection_id: self.id.clone(),
            operation,
            state: self.state,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("queued_candidates", &self.candidates.len())
            .field("subscribers", &self.events.len())
            .finish()
    }
}

/// Remote streams may carry at most one audio and one video track.
fn check_remote_stream(stream: &dyn MediaStream) -> Result<(), Error> {
    let video_tracks = stream.video_tracks().len();
    let audio_tracks = stream.audio_track_count();
    if video_tracks > 1 || audio_tracks > 1 {
        Err(Error::MalformedStream {
            stream_id: stream.id().to_string(),
            video_tracks,
            audio_tracks,
        })
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ConnectionId {
    fn from(connection_id: &str) -> Self {
        ConnectionId(connection_id.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(connection_id: String) -> Self {
        ConnectionId(connection_id)
    }
}

impl From<&ConnectionId> for ConnectionId {
    fn from(connection_id: &ConnectionId) -> Self {
        connection_id.clone()
    }
}
