mod binding_table;

use std::fmt;

use crate::media::{SinkRef, StreamRef};
use crate::session::ConnectionId;

pub use binding_table::{BindingSnapshot, RendererBindingTable};

/// Logical place a sink can be attached to: the local camera preview, the
/// local screenshare preview, or the video of one remote connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Local,
    Screenshare,
    Remote(ConnectionId),
}

impl Slot {
    pub fn is_remote(&self) -> bool {
        matches!(self, Slot::Remote(_))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Slot::Local => write!(f, "self"),
            Slot::Screenshare => write!(f, "screenshare"),
            Slot::Remote(connection_id) => write!(f, "remote:{connection_id}"),
        }
    }
}

impl From<ConnectionId> for Slot {
    fn from(connection_id: ConnectionId) -> Self {
        Slot::Remote(connection_id)
    }
}

/// A sink the application wants bound to the video of a stream.
#[derive(Debug, Clone)]
pub struct RendererBinding {
    pub slot: Slot,
    pub sink: SinkRef,
    pub stream: StreamRef,
}

impl RendererBinding {
    pub fn new(slot: impl Into<Slot>, sink: SinkRef, stream: StreamRef) -> Self {
        Self {
            slot: slot.into(),
            sink,
            stream,
        }
    }
}
