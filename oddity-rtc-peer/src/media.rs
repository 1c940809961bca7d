//! Media objects owned by the media engine. The core only holds references
//! to them and never creates or destroys them.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

/// A decoded video frame as delivered by the engine to a sink.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub timestamp_us: i64,
    pub data: Bytes,
}

/// Rendering destination that frames of a video track are pushed to.
pub trait VideoSink: Send + Sync + fmt::Debug {
    fn on_frame(&self, frame: &VideoFrame);
}

pub type SinkRef = Arc<dyn VideoSink>;

pub trait VideoTrack: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    fn set_enabled(&self, enabled: bool);

    fn add_sink(&self, sink: SinkRef);

    fn remove_sink(&self, sink: &SinkRef);
}

pub type VideoTrackRef = Arc<dyn VideoTrack>;

pub trait MediaStream: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    fn video_tracks(&self) -> Vec<VideoTrackRef>;

    fn audio_track_count(&self) -> usize;
}

pub type StreamRef = Arc<dyn MediaStream>;

pub trait DataChannel: Send + Sync + fmt::Debug {
    fn label(&self) -> &str;

    /// Queue a message for sending. Returns `false` if the channel cannot
    /// accept it (not open, or buffer full).
    fn send(&self, buffer: Bytes, binary: bool) -> bool;

    fn close(&self);
}

pub type DataChannelRef = Arc<dyn DataChannel>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChannelInit {
    pub ordered: bool,
    pub max_retransmits: Option<u16>,
    pub max_packet_lifetime_ms: Option<u16>,
    pub protocol: String,
    pub negotiated: bool,
    pub id: Option<u16>,
}

impl Default for DataChannelInit {
    fn default() -> Self {
        Self {
            ordered: true,
            max_retransmits: None,
            max_packet_lifetime_ms: None,
            protocol: String::new(),
            negotiated: false,
            id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for DataChannelState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DataChannelState::Connecting => write!(f, "connecting"),
            DataChannelState::Open => write!(f, "open"),
            DataChannelState::Closing => write!(f, "closing"),
            DataChannelState::Closed => write!(f, "closed"),
        }
    }
}
