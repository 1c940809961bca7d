use std::fmt;
use std::path::Path;

use serde::Deserialize;

use config::{Config, ConfigError, Environment, Source};

use oddity_rtc_protocol::{IceServer, SignalingParameters};

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub peer: PeerConfig,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PeerConfig {
    /// Disables DTLS-SRTP. Only for talking to ourselves.
    #[serde(default)]
    pub loopback: bool,
    #[serde(default)]
    pub ice_servers: Vec<IceServer>,
}

impl PeerConfig {
    pub fn signaling_parameters(&self) -> SignalingParameters {
        SignalingParameters::new(self.ice_servers.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub id: String,
    #[serde(default)]
    pub screenshare: bool,
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.screenshare {
            write!(f, "{} (screenshare)", self.id)
        } else {
            write!(f, "{}", self.id)
        }
    }
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::load(config::File::from(path))
    }

    fn load<S>(source: S) -> Result<Self, ConfigError>
    where
        S: Source + Send + Sync + 'static,
    {
        Config::builder()
            .add_source(source)
            .add_source(Environment::with_prefix("oddity").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {

    use config::{File, FileFormat};

    use super::AppConfig;

    #[test]
    fn parse_full_config() {
        let config = AppConfig::load(File::from_str(
            r#"
peer:
  loopback: true
  ice_servers:
    - urls: ["stun:stun.example.org:3478"]
    - urls: ["turn:turn.example.org:3478"]
      username: "user"
      credential: "secret"
connections:
  - id: "alice"
  - id: "alice-screen"
    screenshare: true
"#,
            FileFormat::Yaml,
        ))
        .unwrap();

        assert!(config.peer.loopback);
        assert_eq!(config.peer.ice_servers.len(), 2);
        assert_eq!(config.peer.ice_servers[1].username.as_deref(), Some("user"));
        assert_eq!(config.connections.len(), 2);
        assert!(!config.connections[0].screenshare);
        assert_eq!(config.connections[1].to_string(), "alice-screen (screenshare)");
        assert_eq!(
            config.peer.signaling_parameters().ice_servers,
            config.peer.ice_servers,
        );
    }

    #[test]
    fn everything_is_optional() {
        let config = AppConfig::load(File::from_str("connections: []", FileFormat::Yaml)).unwrap();
        assert!(!config.peer.loopback);
        assert!(config.peer.ice_servers.is_empty());
        assert!(config.connections.is_empty());
    }
}
