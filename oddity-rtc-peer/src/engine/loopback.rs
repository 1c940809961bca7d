//! In-process media engine that negotiates with itself.
//!
//! Every command is answered right away by posting the callback a real
//! engine would eventually deliver. No media flows; streams and tracks exist
//! only so renderers have something to bind to.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use bytes::Bytes;
use rand::Rng;

use oddity_rtc_protocol::{
    Candidate, Description, DescriptionKind, IceConnectionState, MediaConstraints,
    RtcConfiguration,
};

use crate::engine::{DescriptionSide, EngineConnection, EngineError, EngineEvents, MediaEngine};
use crate::media::{
    DataChannel, DataChannelInit, DataChannelRef, DataChannelState, MediaStream, SinkRef,
    VideoTrack, VideoTrackRef,
};
use crate::session::ConnectionId;

const HOST_CANDIDATES: u32 = 2;

#[derive(Debug, Default)]
pub struct LoopbackEngine;

impl LoopbackEngine {
    pub fn new() -> Self {
        Self
    }
}

impl MediaEngine for LoopbackEngine {
    fn create_connection(
        &mut self,
        connection_id: &ConnectionId,
        configuration: &RtcConfiguration,
        _constraints: &MediaConstraints,
        events: EngineEvents,
    ) -> Result<Box<dyn EngineConnection>, EngineError> {
        tracing::trace!(%connection_id, %configuration, "loopback connection created");
        Ok(Box::new(LoopbackConnection {
            connection_id: connection_id.clone(),
            session_id: rand::random(),
            events,
            gathered: false,
            connected: false,
        }))
    }
}

struct LoopbackConnection {
    connection_id: ConnectionId,
    session_id: u32,
    events: EngineEvents,
    gathered: bool,
    connected: bool,
}

impl EngineConnection for LoopbackConnection {
    fn create_description(&mut self, kind: DescriptionKind, constraints: &MediaConstraints) {
        let receive_video = constraints
            .get("OfferToReceiveVideo")
            .map_or(true, |value| value.eq_ignore_ascii_case("true"));
        let body = session_description(kind, self.session_id, receive_video);
        self.events
            .local_description_created(Description::new(kind, body));
    }

    fn set_local_description(&mut self, description: &Description) {
        if !is_session_description(description) {
            self.events
                .description_apply_failed(DescriptionSide::Local, "not a session description");
            return;
        }
        self.events.description_applied(DescriptionSide::Local);

        if !self.gathered {
            self.gathered = true;
            let mut rng = rand::thread_rng();
            for foundation in 1..=HOST_CANDIDATES {
                let port: u16 = rng.gen_range(49152..65535);
                let line =
                    format!("a=candidate:{foundation} 1 udp 2122260223 127.0.0.1 {port} typ host");
                match Candidate::from_sdp_line("0", 0, &line) {
                    Ok(candidate) => self.events.candidate_discovered(candidate),
                    Err(err) => {
                        tracing::warn!(connection_id=%self.connection_id, %err, "skipping host candidate")
                    }
                }
            }
            self.events.ice_status_changed(IceConnectionState::Checking);
        }
    }

    fn set_remote_description(&mut self, description: &Description) {
        if is_session_description(description) {
            self.events.description_applied(DescriptionSide::Remote);
        } else {
            self.events
                .description_apply_failed(DescriptionSide::Remote, "not a session description");
        }
    }

    fn add_ice_candidate(&mut self, candidate: &Candidate) {
        let line = candidate.to_sdp_line();
        if let Err(err) = Candidate::from_sdp_line(
            candidate.media_stream_id.as_str(),
            candidate.media_line_index,
            &line,
        ) {
            tracing::warn!(connection_id=%self.connection_id, %err, "ignoring remote candidate");
            return;
        }
        tracing::trace!(connection_id=%self.connection_id, %line, "loopback candidate");
        if !self.connected {
            self.connected = true;
            self.events
                .ice_status_changed(IceConnectionState::Connected);
            self.events.stream_added(LoopbackStream::new(&format!(
                "{}-remote",
                self.connection_id
            )));
        }
    }

    fn create_data_channel(
        &mut self,
        label: &str,
        init: &DataChannelInit,
    ) -> Result<DataChannelRef, EngineError> {
        if init.negotiated && init.id.is_none() {
            return Err(EngineError::new(format!(
                "negotiated data channel {label} needs an id"
            )));
        }
        let channel: DataChannelRef = LoopbackDataChannel::open(label, self.events.clone());
        self.events
            .data_channel_state_changed(channel.clone(), DataChannelState::Open);
        Ok(channel)
    }

    fn close(&mut self) -> Result<(), EngineError> {
        tracing::trace!(connection_id=%self.connection_id, "loopback connection closed");
        Ok(())
    }
}

/// Synthesizes the answer a remote loopback peer would send for `offer`.
pub fn answer_for(offer: &Description) -> Description {
    if !offer.is_offer() {
        tracing::warn!(%offer, "answering a description that is not an offer");
    }
    let receive_video = !offer.body.contains("a=sendonly");
    Description::answer(session_description(
        DescriptionKind::Answer,
        rand::random(),
        receive_video,
    ))
}

fn session_description(kind: DescriptionKind, session_id: u32, receive_video: bool) -> String {
    let setup = match kind {
        DescriptionKind::Offer => "actpass",
        DescriptionKind::Answer => "active",
    };
    let direction = if receive_video { "sendrecv" } else { "sendonly" };
    [
        "v=0".to_string(),
        format!("o=- {session_id} 2 IN IP4 127.0.0.1"),
        "s=-".to_string(),
        "t=0 0".to_string(),
        "a=group:BUNDLE 0".to_string(),
        "m=video 9 UDP/TLS/RTP/SAVPF 96".to_string(),
        "c=IN IP4 0.0.0.0".to_string(),
        "a=mid:0".to_string(),
        format!("a=setup:{setup}"),
        format!("a={direction}"),
        "a=rtcp-mux".to_string(),
        "a=rtpmap:96 VP8/90000".to_string(),
        String::new(),
    ]
    .join("\r\n")
}

fn is_session_description(description: &Description) -> bool {
    description.body.starts_with("v=0")
}

/// Stream with exactly one video track and one audio track.
#[derive(Debug)]
pub struct LoopbackStream {
    id: String,
    video: Arc<LoopbackTrack>,
}

impl LoopbackStream {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            video: Arc::new(LoopbackTrack::new(&format!("{id}-video"))),
        })
    }

    pub fn video(&self) -> &Arc<LoopbackTrack> {
        &self.video
    }
}

impl MediaStream for LoopbackStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn video_tracks(&self) -> Vec<VideoTrackRef> {
        vec![self.video.clone() as VideoTrackRef]
    }

    fn audio_track_count(&self) -> usize {
        1
    }
}

#[derive(Debug)]
pub struct LoopbackTrack {
    id: String,
    enabled: AtomicBool,
    sinks: Mutex<Vec<SinkRef>>,
}

impl LoopbackTrack {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            enabled: AtomicBool::new(false),
            sinks: Mutex::new(Vec::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn sink_count(&self) -> usize {
        self.sinks().len()
    }

    fn sinks(&self) -> MutexGuard<'_, Vec<SinkRef>> {
        self.sinks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl VideoTrack for LoopbackTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn add_sink(&self, sink: SinkRef) {
        self.sinks().push(sink);
    }

    fn remove_sink(&self, sink: &SinkRef) {
        self.sinks()
            .retain(|added| Arc::as_ptr(added).cast::<()>() != Arc::as_ptr(sink).cast::<()>());
    }
}

/// Data channel that echoes everything sent on it back as a received
/// message.
pub struct LoopbackDataChannel {
    label: String,
    open: AtomicBool,
    events: EngineEvents,
    this: Weak<LoopbackDataChannel>,
}

impl LoopbackDataChannel {
    fn open(label: &str, events: EngineEvents) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            label: label.to_string(),
            open: AtomicBool::new(true),
            events,
            this: this.clone(),
        })
    }
}

impl std::fmt::Debug for LoopbackDataChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("LoopbackDataChannel")
            .field("label", &self.label)
            .field("open", &self.open.load(Ordering::Relaxed))
            .finish()
    }
}

impl DataChannel for LoopbackDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn send(&self, buffer: Bytes, binary: bool) -> bool {
        if !self.open.load(Ordering::Relaxed) {
            return false;
        }
        match self.this.upgrade() {
            Some(this) => {
                self.events.data_channel_message(this, buffer, binary);
                true
            }
            None => false,
        }
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::Relaxed) {
            if let Some(this) = self.this.upgrade() {
                self.events
                    .data_channel_state_changed(this, DataChannelState::Closed);
            }
        }
    }
}
