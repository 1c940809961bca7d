use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Error;
use crate::media::{MediaStream, SinkRef, StreamRef, VideoTrackRef};
use crate::renderer::{RendererBinding, Slot};

struct Binding {
    sink: SinkRef,
    stream: StreamRef,
    /// Cleared when the engine reports the stream as removed.
    track: Option<VideoTrackRef>,
}

/// Point-in-time view of one binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSnapshot {
    pub slot: Slot,
    pub stream_id: String,
    pub track_id: Option<String>,
}

/// Tracks which sink is attached to which video track, per slot. At most one
/// sink is bound to a slot, and this table never adds more than one sink to
/// a track.
pub struct RendererBindingTable {
    bindings: HashMap<Slot, Binding>,
    render_video: bool,
}

impl RendererBindingTable {
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
            render_video: true,
        }
    }

    /// Binds `sink` to the only video track of `stream`. Whatever was bound
    /// to the slot before is detached first. Screenshare sinks always go to
    /// the screenshare slot.
    pub fn attach(
        &mut self,
        slot: Slot,
        sink: SinkRef,
        stream: StreamRef,
        is_screenshare: bool,
    ) -> Result<(), Error> {
        let slot = if is_screenshare { Slot::Screenshare } else { slot };
        let track = only_video_track(stream.as_ref())?;

        if self.bindings.contains_key(&slot) {
            tracing::debug!(%slot, "detaching previous sink");
            self.detach(&slot);
        }

        let holders: Vec<Slot> = self
            .bindings
            .iter()
            .filter(|(_, binding)| {
                binding
                    .track
                    .as_ref()
                    .map_or(false, |bound| same_track(bound, &track))
            })
            .map(|(holder, _)| holder.clone())
            .collect();
        for holder in holders {
            tracing::warn!(%slot, %holder, track_id=track.id(), "track already bound to another slot, detaching it there");
            self.detach(&holder);
        }

        track.set_enabled(self.render_video);
        track.add_sink(sink.clone());
        tracing::info!(%slot, stream_id=stream.id(), track_id=track.id(), "renderer attached");
        self.bindings.insert(
            slot,
            Binding {
                sink,
                stream,
                track: Some(track),
            },
        );
        Ok(())
    }

    /// Removes the sink of the slot from its track. A slot without a
    /// complete binding is left alone apart from dropping its stale record.
    pub fn detach(&mut self, slot: &Slot) {
        match self.resolve(slot) {
            Ok((sink, track)) => {
                if *slot == Slot::Screenshare {
                    track.set_enabled(false);
                }
                track.remove_sink(&sink);
                self.bindings.remove(slot);
                tracing::info!(%slot, track_id=track.id(), "renderer detached");
            }
            Err(err) => {
                if self.bindings.remove(slot).is_some() {
                    tracing::warn!(%slot, %err, "dropped incomplete binding");
                } else {
                    tracing::trace!(%slot, "nothing attached");
                }
            }
        }
    }

    /// Disables every bound track and detaches every slot.
    pub fn detach_all(&mut self) {
        for binding in self.bindings.values() {
            if let Some(track) = &binding.track {
                track.set_enabled(false);
            }
        }

        let (remote, local): (Vec<Slot>, Vec<Slot>) =
            self.bound_slots().into_iter().partition(Slot::is_remote);
        tracing::debug!(remote = remote.len(), local = local.len(), "detaching all renderers");
        for slot in remote.iter().chain(local.iter()) {
            self.detach(slot);
        }
        self.bindings.clear();
    }

    /// Binds a fresh set of sinks after the previous sinks became invalid.
    /// Bindings with an unusable stream are skipped.
    pub fn reattach_all(&mut self, bindings: Vec<RendererBinding>) {
        tracing::debug!(count = bindings.len(), "reattaching renderers");
        for RendererBinding { slot, sink, stream } in bindings {
            let stream_id = stream.id().to_string();
            if let Err(err) = self.attach(slot.clone(), sink, stream, false) {
                tracing::warn!(%slot, %stream_id, %err, "skipping renderer");
            }
        }
    }

    pub fn set_all_tracks_enabled(&mut self, enabled: bool) {
        tracing::debug!(enabled, "setting all tracks enabled");
        self.render_video = enabled;
        for binding in self.bindings.values() {
            if let Some(track) = &binding.track {
                track.set_enabled(enabled);
            }
        }
    }

    /// Drops the track link of every binding bound to this very stream.
    /// Streams of other connections may share its id and are not touched.
    /// Returns the number of bindings affected.
    pub fn forget_stream(&mut self, stream: &StreamRef) -> usize {
        let mut forgotten = 0;
        for (slot, binding) in self.bindings.iter_mut() {
            if same_stream(&binding.stream, stream) && binding.track.take().is_some() {
                tracing::debug!(%slot, stream_id = stream.id(), "stream removed, forgetting track");
                forgotten += 1;
            }
        }
        forgotten
    }

    pub fn render_video(&self) -> bool {
        self.render_video
    }

    pub fn binding(&self, slot: &Slot) -> Option<BindingSnapshot> {
        self.bindings.get(slot).map(|binding| BindingSnapshot {
            slot: slot.clone(),
            stream_id: binding.stream.id().to_string(),
            track_id: binding.track.as_ref().map(|track| track.id().to_string()),
        })
    }

    pub fn bound_slots(&self) -> Vec<Slot> {
        let mut slots: Vec<Slot> = self.bindings.keys().cloned().collect();
        slots.sort();
        slots
    }

    fn resolve(&self, slot: &Slot) -> Result<(SinkRef, VideoTrackRef), Error> {
        let binding = self.bindings.get(slot).ok_or_else(|| Error::MissingBinding {
            slot: slot.clone(),
            link: "sink",
        })?;
        let track = binding.track.clone().ok_or_else(|| Error::MissingBinding {
            slot: slot.clone(),
            link: "track",
        })?;
        Ok((binding.sink.clone(), track))
    }
}

impl Default for RendererBindingTable {
    fn default() -> Self {
        Self::new()
    }
}

fn only_video_track(stream: &dyn MediaStream) -> Result<VideoTrackRef, Error> {
    let mut video_tracks = stream.video_tracks();
    if video_tracks.len() == 1 {
        Ok(video_tracks.remove(0))
    } else {
        Err(Error::MalformedStream {
            stream_id: stream.id().to_string(),
            video_tracks: video_tracks.len(),
            audio_tracks: stream.audio_track_count(),
        })
    }
}

fn same_track(a: &VideoTrackRef, b: &VideoTrackRef) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

fn same_stream(a: &StreamRef, b: &StreamRef) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}
