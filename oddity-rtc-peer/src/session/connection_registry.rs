use std::collections::{hash_map::Entry, HashMap};
use std::panic::{self, AssertUnwindSafe};

use oddity_rtc_protocol::{
    BundlePolicy, KeyType, MediaConstraints, RtcConfiguration, RtcpMuxPolicy,
    SignalingParameters, TcpCandidatePolicy,
};

use crate::engine::{EngineEvents, MediaEngine};
use crate::error::Error;
use crate::session::{ConnectionId, Session};

/// Owns every live session, keyed by connection identifier.
pub struct ConnectionRegistry {
    engine: Box<dyn MediaEngine>,
    loopback: bool,
    sessions: HashMap<ConnectionId, Session>,
}

impl ConnectionRegistry {
    pub fn new(engine: Box<dyn MediaEngine>, loopback: bool) -> Self {
        Self {
            engine,
            loopback,
            sessions: HashMap::new(),
        }
    }

    /// Transport policy used for every connection. Only the ICE servers
    /// vary; DTLS-SRTP is disabled in loopback mode.
    pub fn configuration(&self, parameters: &SignalingParameters) -> RtcConfiguration {
        RtcConfiguration {
            ice_servers: parameters.ice_servers.clone(),
            tcp_candidate_policy: TcpCandidatePolicy::Disabled,
            bundle_policy: BundlePolicy::MaxBundle,
            rtcp_mux_policy: RtcpMuxPolicy::Require,
            key_type: KeyType::Ecdsa,
            enable_dtls_srtp: !self.loopback,
        }
    }

    pub fn create_connection(
        &mut self,
        parameters: &SignalingParameters,
        constraints: &MediaConstraints,
        connection_id: ConnectionId,
        is_screenshare: bool,
        events: EngineEvents,
    ) -> Result<&mut Session, Error> {
        let configuration = self.configuration(parameters);
        match self.sessions.entry(connection_id.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateConnectionId(connection_id)),
            Entry::Vacant(entry) => {
                tracing::debug!(%connection_id, %configuration, is_screenshare, "creating connection");
                let connection = self.engine.create_connection(
                    &connection_id,
                    &configuration,
                    constraints,
                    events,
                )?;
                tracing::info!(%connection_id, "registered new connection");
                Ok(entry.insert(Session::new(connection_id, is_screenshare, connection)))
            }
        }
    }

    pub fn get(&self, connection_id: &ConnectionId) -> Option<&Session> {
        self.sessions.get(connection_id)
    }

    pub fn get_mut(&mut self, connection_id: &ConnectionId) -> Option<&mut Session> {
        self.sessions.get_mut(connection_id)
    }

    /// Closes and forgets one connection. Returns `false` if there was no
    /// such connection.
    pub fn close_connection(&mut self, connection_id: &ConnectionId) -> bool {
        match self.sessions.remove(connection_id) {
            Some(mut session) => {
                if let Err(err) = session.close() {
                    tracing::warn!(%connection_id, %err, "failed to close connection cleanly");
                }
                tracing::info!(%connection_id, "unregistered connection");
                true
            }
            None => {
                tracing::trace!(%connection_id, "no connection to close");
                false
            }
        }
    }

    /// Closes every connection. A connection that fails to close, or panics
    /// while closing, is logged and does not keep the others open.
    pub fn close_all(&mut self) {
        let mut sessions: Vec<(ConnectionId, Session)> = self.sessions.drain().collect();
        sessions.sort_by(|(a, _), (b, _)| a.cmp(b));
        tracing::debug!(count = sessions.len(), "closing all connections");
        for (connection_id, mut session) in sessions {
            match panic::catch_unwind(AssertUnwindSafe(|| session.close())) {
                Ok(Ok(())) => {
                    tracing::trace!(%connection_id, "closed connection");
                }
                Ok(Err(err)) => {
                    tracing::warn!(%connection_id, %err, "failed to close connection cleanly");
                }
                Err(_) => {
                    tracing::error!(%connection_id, "panic while closing connection");
                }
            }
        }
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut connection_ids: Vec<ConnectionId> = self.sessions.keys().cloned().collect();
        connection_ids.sort();
        connection_ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {

    use oddity_rtc_protocol::{
        BundlePolicy, IceServer, KeyType, MediaConstraints, RtcpMuxPolicy, SignalingParameters,
        TcpCandidatePolicy,
    };

    use super::ConnectionRegistry;
    use crate::error::Error;
    use crate::session::ConnectionId;
    use crate::testing::{Command, RecordingEngine};

    fn parameters() -> SignalingParameters {
        SignalingParameters::new(vec![IceServer::new("stun:stun.example.org:3478")])
    }

    fn create(
        registry: &mut ConnectionRegistry,
        engine: &RecordingEngine,
        id: &str,
    ) -> Result<(), Error> {
        registry
            .create_connection(
                &parameters(),
                &MediaConstraints::new(),
                ConnectionId::from(id),
                false,
                engine.detached_events(id),
            )
            .map(|_| ())
    }

    #[test]
    fn configuration_is_fixed_apart_from_ice_servers() {
        let registry = ConnectionRegistry::new(Box::new(RecordingEngine::new()), false);
        let configuration = registry.configuration(&parameters());
        assert_eq!(configuration.ice_servers, parameters().ice_servers);
        assert_eq!(configuration.tcp_candidate_policy, TcpCandidatePolicy::Disabled);
        assert_eq!(configuration.bundle_policy, BundlePolicy::MaxBundle);
        assert_eq!(configuration.rtcp_mux_policy, RtcpMuxPolicy::Require);
        assert_eq!(configuration.key_type, KeyType::Ecdsa);
        assert!(configuration.enable_dtls_srtp);

        let loopback = ConnectionRegistry::new(Box::new(RecordingEngine::new()), true);
        assert!(!loopback.configuration(&parameters()).enable_dtls_srtp);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let engine = RecordingEngine::new();
        let mut registry = ConnectionRegistry::new(Box::new(engine.clone()), false);
        create(&mut registry, &engine, "c1").unwrap();
        assert!(matches!(
            create(&mut registry, &engine, "c1"),
            Err(Error::DuplicateConnectionId(_)),
        ));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            engine
                .commands()
                .iter()
                .filter(|command| matches!(command, Command::CreateConnection { .. }))
                .count(),
            1,
        );
    }

    #[test]
    fn close_connection_forgets_session() {
        let engine = RecordingEngine::new();
        let mut registry = ConnectionRegistry::new(Box::new(engine.clone()), false);
        create(&mut registry, &engine, "c1").unwrap();
        assert!(registry.close_connection(&ConnectionId::from("c1")));
        assert!(!registry.close_connection(&ConnectionId::from("c1")));
        assert!(registry.get(&ConnectionId::from("c1")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn close_all_continues_past_failures() {
        let engine = RecordingEngine::new();
        let mut registry = ConnectionRegistry::new(Box::new(engine.clone()), false);
        for id in ["a", "b", "c"] {
            create(&mut registry, &engine, id).unwrap();
        }
        engine.fail_close_of("a");
        engine.panic_close_of("b");

        registry.close_all();

        assert!(registry.is_empty());
        let closed: Vec<ConnectionId> = engine
            .commands()
            .into_iter()
            .filter_map(|command| match command {
                Command::Close { connection_id } => Some(connection_id),
                _ => None,
            })
            .collect();
        let expected: Vec<ConnectionId> = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(closed, expected);
    }

    #[test]
    fn connection_ids_are_sorted() {
        let engine = RecordingEngine::new();
        let mut registry = ConnectionRegistry::new(Box::new(engine.clone()), false);
        for id in ["zeta", "alpha", "mid"] {
            create(&mut registry, &engine, id).unwrap();
        }
        let expected: Vec<ConnectionId> = vec!["alpha".into(), "mid".into(), "zeta".into()];
        assert_eq!(registry.connection_ids(), expected);
    }
}
