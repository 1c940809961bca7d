use std::fmt;
use std::sync::Arc;

use oddity_rtc_protocol::{Candidate, Description, MediaConstraints, SignalingParameters};

use crate::engine::{EngineEvent, EngineEvents, MediaEngine};
use crate::error::Error;
use crate::events::{self, EventStream, SubscriberRef};
use crate::media::{DataChannelInit, DataChannelRef, MediaStream, SinkRef, StreamRef};
use crate::renderer::{BindingSnapshot, RendererBinding, RendererBindingTable, Slot};
use crate::runtime::serial::{QueueHandle, SerialTaskQueue};
use crate::runtime::Runtime;
use crate::session::connection_registry::ConnectionRegistry;
use crate::session::{ConnectionId, Session, SessionState};

/// State owned by the serial task queue. Only tasks running on the queue
/// ever touch it.
pub(crate) struct Core {
    registry: ConnectionRegistry,
    renderers: RendererBindingTable,
}

impl Core {
    fn new(registry: ConnectionRegistry) -> Self {
        Self {
            registry,
            renderers: RendererBindingTable::new(),
        }
    }

    pub(crate) fn on_engine_event(
        &mut self,
        connection_id: &ConnectionId,
        event: EngineEvent,
    ) -> Result<(), Error> {
        if let EngineEvent::StreamRemoved(stream) = &event {
            self.renderers.forget_stream(stream);
        }
        self.with_session(connection_id, |session| session.on_engine_event(event))
    }

    fn with_session<F>(&mut self, connection_id: &ConnectionId, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Session) -> Result<(), Error>,
    {
        let result = match self.registry.get_mut(connection_id) {
            Some(session) => f(session),
            None => Err(Error::ConnectionAlreadyClosed(connection_id.clone())),
        };
        absorb_closed(result)
    }
}

/// Work that arrives for a connection that is already gone is dropped.
fn absorb_closed(result: Result<(), Error>) -> Result<(), Error> {
    match result {
        Err(Error::ConnectionAlreadyClosed(connection_id)) => {
            tracing::debug!(%connection_id, "connection closed, ignoring");
            Ok(())
        }
        result => result,
    }
}

/// Entry point of the signaling core.
///
/// Every operation is queued and runs later on a single worker, in the order
/// it was issued, interleaved with the callbacks of the media engine. Calls
/// that do not return a value only fail if the worker is gone.
pub struct Peer {
    queue: SerialTaskQueue<Core>,
    handle: QueueHandle<Core>,
}

impl Peer {
    pub async fn start<E: MediaEngine>(engine: E, loopback: bool, runtime: &Runtime) -> Self {
        let registry = ConnectionRegistry::new(Box::new(engine), loopback);
        let queue = SerialTaskQueue::start(Core::new(registry), runtime).await;
        let handle = queue.handle();
        tracing::debug!(loopback, "peer started");
        Self { queue, handle }
    }

    pub async fn create_connection(
        &self,
        parameters: SignalingParameters,
        constraints: MediaConstraints,
        connection_id: impl Into<ConnectionId>,
        is_screenshare: bool,
    ) -> Result<SessionHandle, Error> {
        let connection_id = connection_id.into();
        let events = EngineEvents::new(connection_id.clone(), self.handle.clone());
        self.handle
            .query("create connection", {
                let connection_id = connection_id.clone();
                move |core| {
                    core.registry
                        .create_connection(
                            &parameters,
                            &constraints,
                            connection_id,
                            is_screenshare,
                            events,
                        )
                        .map(|_| ())
                }
            })
            .await??;
        Ok(self.session_handle(connection_id))
    }

    /// Handle to an existing connection, or `None` if there is no
    /// connection with this identifier.
    pub async fn get_connection(
        &self,
        connection_id: impl Into<ConnectionId>,
    ) -> Result<Option<SessionHandle>, Error> {
        let connection_id = connection_id.into();
        let exists = self
            .handle
            .query("get connection", {
                let connection_id = connection_id.clone();
                move |core| core.registry.get(&connection_id).is_some()
            })
            .await?;
        Ok(exists.then(|| self.session_handle(connection_id)))
    }

    pub fn close_connection(&self, connection_id: impl Into<ConnectionId>) -> Result<(), Error> {
        let connection_id = connection_id.into();
        self.handle.submit("close connection", move |core| {
            core.registry.close_connection(&connection_id);
            Ok(())
        })
    }

    pub fn close_all(&self) -> Result<(), Error> {
        self.handle.submit("close all", |core| {
            core.registry.close_all();
            Ok(())
        })
    }

    pub async fn connection_ids(&self) -> Result<Vec<ConnectionId>, Error> {
        self.handle
            .query("connection ids", |core| core.registry.connection_ids())
            .await
    }

    /// Registers a subscriber on a connection and returns the stream of its
    /// events.
    pub fn subscribe_stream(
        &self,
        connection_id: impl Into<ConnectionId>,
    ) -> Result<EventStream, Error> {
        self.session_handle(connection_id.into()).subscribe()
    }

    pub fn attach(
        &self,
        slot: impl Into<Slot>,
        sink: SinkRef,
        stream: StreamRef,
        is_screenshare: bool,
    ) -> Result<(), Error> {
        let slot = slot.into();
        self.handle.submit("attach renderer", move |core| {
            core.renderers.attach(slot, sink, stream, is_screenshare)
        })
    }

    pub fn detach(&self, slot: impl Into<Slot>) -> Result<(), Error> {
        let slot = slot.into();
        self.handle.submit("detach renderer", move |core| {
            core.renderers.detach(&slot);
            Ok(())
        })
    }

    pub fn detach_all(&self) -> Result<(), Error> {
        self.handle.submit("detach all renderers", |core| {
            core.renderers.detach_all();
            Ok(())
        })
    }

    pub fn reattach_all(&self, bindings: Vec<RendererBinding>) -> Result<(), Error> {
        self.handle.submit("reattach all renderers", move |core| {
            core.renderers.reattach_all(bindings);
            Ok(())
        })
    }

    pub fn set_all_tracks_enabled(&self, enabled: bool) -> Result<(), Error> {
        self.handle.submit("set all tracks enabled", move |core| {
            core.renderers.set_all_tracks_enabled(enabled);
            Ok(())
        })
    }

    pub async fn binding(&self, slot: impl Into<Slot>) -> Result<Option<BindingSnapshot>, Error> {
        let slot = slot.into();
        self.handle
            .query("binding", move |core| core.renderers.binding(&slot))
            .await
    }

    /// Resolves once everything issued before this call has run.
    pub async fn flush(&self) -> Result<(), Error> {
        self.handle.flush().await
    }

    /// Closes every connection and stops the worker.
    pub async fn stop(&mut self) {
        if self.close_all().is_err() {
            tracing::trace!("task queue already closed");
        }
        self.queue.stop().await;
        tracing::debug!("peer stopped");
    }

    fn session_handle(&self, connection_id: ConnectionId) -> SessionHandle {
        SessionHandle {
            connection_id,
            queue: self.handle.clone(),
        }
    }
}

/// Application-side handle to one connection. Holding a handle does not
/// keep the connection open; operations on a closed connection are ignored.
#[derive(Clone)]
pub struct SessionHandle {
    connection_id: ConnectionId,
    queue: QueueHandle<Core>,
}

impl SessionHandle {
    pub fn id(&self) -> &ConnectionId {
        &self.connection_id
    }

    pub fn request_offer(&self, constraints: MediaConstraints) -> Result<(), Error> {
        self.submit("request offer", move |session| {
            session.request_offer(&constraints)
        })
    }

    pub fn request_answer(&self, constraints: MediaConstraints) -> Result<(), Error> {
        self.submit("request answer", move |session| {
            session.request_answer(&constraints)
        })
    }

    pub fn apply_remote_description(&self, description: Description) -> Result<(), Error> {
        self.submit("apply remote description", move |session| {
            session.apply_remote_description(description)
        })
    }

    pub fn add_remote_candidate(&self, candidate: Candidate) -> Result<(), Error> {
        self.submit("add remote candidate", move |session| {
            session.add_remote_candidate(candidate)
        })
    }

    pub fn add_subscriber(&self, subscriber: SubscriberRef) -> Result<(), Error> {
        self.submit("add subscriber", move |session| {
            session.add_subscriber(subscriber);
            Ok(())
        })
    }

    /// Registers a channel subscriber. The stream ends when the connection
    /// is closed.
    pub fn subscribe(&self) -> Result<EventStream, Error> {
        let (tx, stream) = events::channel();
        self.add_subscriber(Arc::new(tx))?;
        Ok(stream)
    }

    pub async fn create_data_channel(
        &self,
        label: impl Into<String>,
        init: DataChannelInit,
    ) -> Result<DataChannelRef, Error> {
        let label = label.into();
        let connection_id = self.connection_id.clone();
        self.queue
            .query("create data channel", move |core| {
                match core.registry.get_mut(&connection_id) {
                    Some(session) => session.create_data_channel(&label, &init),
                    None => Err(Error::ConnectionAlreadyClosed(connection_id)),
                }
            })
            .await?
    }

    pub async fn data_channel(&self, label: impl Into<String>) -> Result<Option<DataChannelRef>, Error> {
        let label = label.into();
        let connection_id = self.connection_id.clone();
        self.queue
            .query("data channel", move |core| {
                core.registry
                    .get(&connection_id)
                    .and_then(|session| session.data_channel(&label))
            })
            .await
    }

    pub async fn data_channel_labels(&self) -> Result<Vec<String>, Error> {
        let connection_id = self.connection_id.clone();
        self.queue
            .query("data channel labels", move |core| {
                core.registry
                    .get(&connection_id)
                    .map(Session::data_channel_labels)
                    .unwrap_or_default()
            })
            .await
    }

    /// Negotiation state. A connection that no longer exists is `Closed`.
    pub async fn state(&self) -> Result<SessionState, Error> {
        let connection_id = self.connection_id.clone();
        self.queue
            .query("session state", move |core| {
                core.registry
                    .get(&connection_id)
                    .map_or(SessionState::Closed, Session::state)
            })
            .await
    }

    pub fn close(&self) -> Result<(), Error> {
        let connection_id = self.connection_id.clone();
        self.queue.submit("close connection", move |core| {
            core.registry.close_connection(&connection_id);
            Ok(())
        })
    }

    fn submit<F>(&self, name: &'static str, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Session) -> Result<(), Error> + Send + 'static,
    {
        let connection_id = self.connection_id.clone();
        self.queue
            .submit(name, move |core| core.with_session(&connection_id, f))
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("connection_id", &self.connection_id)
            .finish()
    }
}
