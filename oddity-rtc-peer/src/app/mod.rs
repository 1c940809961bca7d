pub mod config;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use tokio::select;
use tokio::signal;
use tokio_stream::StreamExt;

use oddity_rtc_protocol::{IceConnectionState, MediaConstraints};

use crate::app::config::AppConfig;
use crate::engine::loopback::{answer_for, LoopbackEngine, LoopbackStream};
use crate::error::Error;
use crate::events::{self, EventStream, Notification, SessionEvent};
use crate::media::{DataChannelInit, SinkRef, VideoFrame, VideoSink};
use crate::peer::{Peer, SessionHandle};
use crate::renderer::Slot;
use crate::runtime::Runtime;
use crate::session::ConnectionId;

/// Demo application: negotiates every configured connection against the
/// in-process loopback engine and renders whatever comes back.
pub struct App {
    config: AppConfig,
    peer: Peer,
    runtime: Runtime,
    sessions: HashMap<ConnectionId, SessionHandle>,
    negotiated: HashSet<ConnectionId>,
    events: Option<EventStream>,
}

impl App {
    pub async fn start(config: AppConfig) -> Result<App, Error> {
        let runtime = Runtime::new();
        let peer = Peer::start(LoopbackEngine::new(), config.peer.loopback, &runtime).await;

        let (notification_tx, events) = events::channel();
        let mut sessions = HashMap::new();
        for connection in &config.connections {
            let session = peer
                .create_connection(
                    config.peer.signaling_parameters(),
                    MediaConstraints::new().with_mandatory("OfferToReceiveVideo", "true"),
                    connection.id.as_str(),
                    connection.screenshare,
                )
                .await?;
            session.add_subscriber(Arc::new(notification_tx.clone()))?;
            tracing::info!(%connection, "created connection");
            sessions.insert(session.id().clone(), session);
        }

        peer.attach(
            Slot::Local,
            Arc::new(LogSink::new("self")),
            LoopbackStream::new("local"),
            false,
        )?;

        Ok(Self {
            config,
            peer,
            runtime,
            sessions,
            negotiated: HashSet::new(),
            events: Some(events),
        })
    }

    /// Drives negotiation until every connection is connected or Ctrl-C is
    /// pressed.
    pub async fn run(&mut self) -> Result<(), Error> {
        let Some(mut events) = self.events.take() else {
            tracing::warn!("app already ran");
            return Ok(());
        };
        if self.sessions.is_empty() {
            tracing::info!("no connections configured");
            return Ok(());
        }

        for session in self.sessions.values() {
            session.request_offer(MediaConstraints::new())?;
        }

        let ctrl_c = signal::ctrl_c();
        tokio::pin!(ctrl_c);
        loop {
            select! {
                // CANCEL SAFETY: `UnboundedReceiverStream::next` is cancel safe.
                notification = events.next() => {
                    match notification {
                        Some(notification) => {
                            self.handle_notification(notification)?;
                            if self.negotiated.len() == self.sessions.len() {
                                tracing::info!("all connections negotiated");
                                break;
                            }
                        },
                        None => break,
                    }
                },
                // CANCEL SAFETY: The pinned future is polled again on the next
                // iteration, so nothing is lost.
                _ = &mut ctrl_c => {
                    tracing::info!("interrupted");
                    break;
                },
            }
        }

        Ok(())
    }

    pub async fn stop(&mut self) {
        tracing::debug!(connections = self.config.connections.len(), "stopping app");
        if self.peer.detach_all().is_err() {
            tracing::trace!("peer already stopped");
        }
        self.peer.stop().await;
        self.runtime.stop().await;
        tracing::info!("stopped");
    }

    fn handle_notification(&mut self, notification: Notification) -> Result<(), Error> {
        let Notification {
            connection_id,
            event,
        } = notification;
        let Some(session) = self.sessions.get(&connection_id) else {
            return Ok(());
        };

        match event {
            SessionEvent::OfferGenerated(offer) => {
                tracing::info!(%connection_id, "offer generated, answering");
                session.apply_remote_description(answer_for(&offer))?;
            }
            SessionEvent::AnswerGenerated(answer) => {
                tracing::info!(%connection_id, %answer, "answer generated");
            }
            SessionEvent::CandidateGenerated(candidate) => {
                tracing::debug!(%connection_id, %candidate, "feeding candidate back");
                session.add_remote_candidate(candidate)?;
            }
            SessionEvent::IceStatusChanged(state) => {
                tracing::info!(%connection_id, %state, "ice status");
                if state == IceConnectionState::Connected {
                    self.negotiated.insert(connection_id.clone());
                    let session = session.clone();
                    tokio::spawn(async move { say_hello(session).await });
                }
            }
            SessionEvent::RemoteStreamAdded(stream) => {
                tracing::info!(%connection_id, stream_id = stream.id(), "remote stream added");
                let is_screenshare = self
                    .config
                    .connections
                    .iter()
                    .any(|connection| connection.id == connection_id.as_str() && connection.screenshare);
                let sink: SinkRef = Arc::new(LogSink::new(connection_id.as_str()));
                self.peer.attach(connection_id, sink, stream, is_screenshare)?;
            }
            SessionEvent::RemoteStreamRemoved(stream) => {
                tracing::info!(%connection_id, stream_id = stream.id(), "remote stream removed");
                self.peer.detach(connection_id)?;
            }
            SessionEvent::ConnectionError(message) => {
                tracing::error!(%connection_id, %message, "connection error");
            }
            event => {
                tracing::debug!(%connection_id, %event, "event");
            }
        }
        Ok(())
    }
}

async fn say_hello(session: SessionHandle) {
    match session
        .create_data_channel("chat", DataChannelInit::default())
        .await
    {
        Ok(channel) => {
            if !channel.send(Bytes::from_static(b"hello"), false) {
                tracing::warn!(connection_id=%session.id(), "data channel refused message");
            }
        }
        Err(err) => {
            tracing::warn!(connection_id=%session.id(), %err, "failed to open data channel");
        }
    }
}

/// Sink that only logs the frames it receives.
#[derive(Debug)]
struct LogSink {
    name: String,
}

impl LogSink {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl VideoSink for LogSink {
    fn on_frame(&self, frame: &VideoFrame) {
        tracing::trace!(
            sink = %self.name,
            width = frame.width,
            height = frame.height,
            timestamp_us = frame.timestamp_us,
            "frame",
        );
    }
}
