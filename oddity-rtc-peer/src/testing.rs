//! Test doubles for the media engine and the media objects it owns.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use oddity_rtc_protocol::{
    Candidate, Description, DescriptionKind, MediaConstraints, RtcConfiguration,
};

use crate::engine::{EngineConnection, EngineError, EngineEvents, MediaEngine};
use crate::media::{
    DataChannel, DataChannelInit, DataChannelRef, MediaStream, SinkRef, StreamRef, VideoFrame,
    VideoSink, VideoTrack, VideoTrackRef,
};
use crate::runtime::serial::QueueHandle;
use crate::session::ConnectionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateConnection {
        connection_id: ConnectionId,
        configuration: RtcConfiguration,
    },
    CreateDescription {
        connection_id: ConnectionId,
        kind: DescriptionKind,
    },
    SetLocalDescription {
        connection_id: ConnectionId,
        description: Description,
    },
    SetRemoteDescription {
        connection_id: ConnectionId,
        description: Description,
    },
    AddIceCandidate {
        connection_id: ConnectionId,
        candidate: Candidate,
    },
    CreateDataChannel {
        connection_id: ConnectionId,
        label: String,
    },
    Close {
        connection_id: ConnectionId,
    },
}

impl Command {
    pub fn connection_id(&self) -> &ConnectionId {
        match self {
            Command::CreateConnection { connection_id, .. }
            | Command::CreateDescription { connection_id, .. }
            | Command::SetLocalDescription { connection_id, .. }
            | Command::SetRemoteDescription { connection_id, .. }
            | Command::AddIceCandidate { connection_id, .. }
            | Command::CreateDataChannel { connection_id, .. }
            | Command::Close { connection_id } => connection_id,
        }
    }
}

#[derive(Default)]
struct Recorded {
    commands: Vec<Command>,
    events: HashMap<ConnectionId, EngineEvents>,
    failing_close: HashSet<ConnectionId>,
    panicking_close: HashSet<ConnectionId>,
    failing_data_channels: bool,
}

/// Engine that records every command and keeps the callback handle of each
/// connection so tests can play the engine's part by hand.
#[derive(Clone, Default)]
pub struct RecordingEngine {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.recorded.lock().unwrap().commands.clone()
    }

    pub fn commands_for(&self, connection_id: &str) -> Vec<Command> {
        let connection_id = ConnectionId::from(connection_id);
        self.commands()
            .into_iter()
            .filter(|command| {
                command.connection_id() == &connection_id
                    && !matches!(command, Command::CreateConnection { .. })
            })
            .collect()
    }

    pub fn candidates_added(&self, connection_id: &str) -> Vec<Candidate> {
        self.commands_for(connection_id)
            .into_iter()
            .filter_map(|command| match command {
                Command::AddIceCandidate { candidate, .. } => Some(candidate),
                _ => None,
            })
            .collect()
    }

    /// Callback handle the engine was given for the connection.
    pub fn events(&self, connection_id: &str) -> EngineEvents {
        self.recorded
            .lock()
            .unwrap()
            .events
            .get(&ConnectionId::from(connection_id))
            .cloned()
            .unwrap_or_else(|| panic!("no connection created for {connection_id}"))
    }

    /// Callback handle that is not connected to any task queue.
    pub fn detached_events(&self, connection_id: &str) -> EngineEvents {
        EngineEvents::new(ConnectionId::from(connection_id), QueueHandle::detached())
    }

    /// Creates a connection outside of any registry.
    pub fn connection(&self, connection_id: &str) -> Box<dyn EngineConnection> {
        let mut engine = self.clone();
        engine
            .create_connection(
                &ConnectionId::from(connection_id),
                &test_configuration(),
                &MediaConstraints::new(),
                self.detached_events(connection_id),
            )
            .unwrap()
    }

    pub fn fail_close_of(&self, connection_id: &str) {
        self.recorded
            .lock()
            .unwrap()
            .failing_close
            .insert(connection_id.into());
    }

    pub fn panic_close_of(&self, connection_id: &str) {
        self.recorded
            .lock()
            .unwrap()
            .panicking_close
            .insert(connection_id.into());
    }

    pub fn fail_data_channels(&self) {
        self.recorded.lock().unwrap().failing_data_channels = true;
    }

    fn record(&self, command: Command) {
        self.recorded.lock().unwrap().commands.push(command);
    }
}

impl MediaEngine for RecordingEngine {
    fn create_connection(
        &mut self,
        connection_id: &ConnectionId,
        configuration: &RtcConfiguration,
        _constraints: &MediaConstraints,
        events: EngineEvents,
    ) -> Result<Box<dyn EngineConnection>, EngineError> {
        {
            let mut recorded = self.recorded.lock().unwrap();
            recorded.commands.push(Command::CreateConnection {
                connection_id: connection_id.clone(),
                configuration: configuration.clone(),
            });
            recorded.events.insert(connection_id.clone(), events);
        }
        Ok(Box::new(RecordingConnection {
            connection_id: connection_id.clone(),
            engine: self.clone(),
        }))
    }
}

struct RecordingConnection {
    connection_id: ConnectionId,
    engine: RecordingEngine,
}

impl EngineConnection for RecordingConnection {
    fn create_description(&mut self, kind: DescriptionKind, _constraints: &MediaConstraints) {
        self.engine.record(Command::CreateDescription {
            connection_id: self.connection_id.clone(),
            kind,
        });
    }

    fn set_local_description(&mut self, description: &Description) {
        self.engine.record(Command::SetLocalDescription {
            connection_id: self.connection_id.clone(),
            description: description.clone(),
        });
    }

    fn set_remote_description(&mut self, description: &Description) {
        self.engine.record(Command::SetRemoteDescription {
            connection_id: self.connection_id.clone(),
            description: description.clone(),
        });
    }

    fn add_ice_candidate(&mut self, candidate: &Candidate) {
        self.engine.record(Command::AddIceCandidate {
            connection_id: self.connection_id.clone(),
            candidate: candidate.clone(),
        });
    }

    fn create_data_channel(
        &mut self,
        label: &str,
        _init: &DataChannelInit,
    ) -> Result<DataChannelRef, EngineError> {
        self.engine.record(Command::CreateDataChannel {
            connection_id: self.connection_id.clone(),
            label: label.to_string(),
        });
        if self.engine.recorded.lock().unwrap().failing_data_channels {
            return Err(EngineError::new("data channels unavailable"));
        }
        Ok(Arc::new(FakeDataChannel::new(label)))
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.engine.record(Command::Close {
            connection_id: self.connection_id.clone(),
        });
        let (failing, panicking) = {
            let recorded = self.engine.recorded.lock().unwrap();
            (
                recorded.failing_close.contains(&self.connection_id),
                recorded.panicking_close.contains(&self.connection_id),
            )
        };
        if panicking {
            panic!("engine exploded while closing {}", self.connection_id);
        }
        if failing {
            return Err(EngineError::new("close failed"));
        }
        Ok(())
    }
}

pub fn test_configuration() -> RtcConfiguration {
    RtcConfiguration {
        ice_servers: Vec::new(),
        tcp_candidate_policy: oddity_rtc_protocol::TcpCandidatePolicy::Disabled,
        bundle_policy: oddity_rtc_protocol::BundlePolicy::MaxBundle,
        rtcp_mux_policy: oddity_rtc_protocol::RtcpMuxPolicy::Require,
        key_type: oddity_rtc_protocol::KeyType::Ecdsa,
        enable_dtls_srtp: false,
    }
}

#[derive(Debug)]
pub struct FakeSink {
    pub name: &'static str,
}

impl VideoSink for FakeSink {
    fn on_frame(&self, _frame: &VideoFrame) {}
}

pub fn sink(name: &'static str) -> SinkRef {
    Arc::new(FakeSink { name })
}

#[derive(Debug)]
pub struct FakeTrack {
    id: String,
    enabled: AtomicBool,
    sinks: Mutex<Vec<SinkRef>>,
}

impl FakeTrack {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            enabled: AtomicBool::new(false),
            sinks: Mutex::new(Vec::new()),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }

    pub fn has_sink(&self, sink: &SinkRef) -> bool {
        self.sinks
            .lock()
            .unwrap()
            .iter()
            .any(|added| same_sink(added, sink))
    }
}

impl VideoTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn add_sink(&self, sink: SinkRef) {
        self.sinks.lock().unwrap().push(sink);
    }

    fn remove_sink(&self, sink: &SinkRef) {
        self.sinks
            .lock()
            .unwrap()
            .retain(|added| !same_sink(added, sink));
    }
}

fn same_sink(a: &SinkRef, b: &SinkRef) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

#[derive(Debug)]
pub struct FakeStream {
    id: String,
    video: Vec<Arc<FakeTrack>>,
    audio: usize,
}

impl FakeStream {
    pub fn new(id: &str, video: Vec<Arc<FakeTrack>>, audio: usize) -> StreamRef {
        Arc::new(Self {
            id: id.to_string(),
            video,
            audio,
        })
    }

    pub fn with_video(id: &str, track: Arc<FakeTrack>) -> StreamRef {
        Self::new(id, vec![track], 1)
    }
}

impl MediaStream for FakeStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn video_tracks(&self) -> Vec<VideoTrackRef> {
        self.video
            .iter()
            .map(|track| track.clone() as VideoTrackRef)
            .collect()
    }

    fn audio_track_count(&self) -> usize {
        self.audio
    }
}

#[derive(Debug)]
pub struct FakeDataChannel {
    label: String,
    sent: Mutex<Vec<Bytes>>,
}

impl FakeDataChannel {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl DataChannel for FakeDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn send(&self, buffer: Bytes, _binary: bool) -> bool {
        self.sent.lock().unwrap().push(buffer);
        true
    }

    fn close(&self) {}
}
