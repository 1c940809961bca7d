use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
}

impl IceConnectionState {
    /// Whether media can flow in this state.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Completed)
    }
}

impl fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = match self {
            Self::New => "new",
            Self::Checking => "checking",
            Self::Connected => "connected",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Disconnected => "disconnected",
            Self::Closed => "closed",
        };
        write!(f, "{state}")
    }
}

impl FromStr for IceConnectionState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "checking" => Ok(Self::Checking),
            "connected" => Ok(Self::Connected),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "disconnected" => Ok(Self::Disconnected),
            "closed" => Ok(Self::Closed),
            _ => Err(Error::IceConnectionStateUnknown {
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {

    use super::{Error, IceConnectionState};

    #[test]
    fn parse_display_agree() {
        for state in [
            IceConnectionState::New,
            IceConnectionState::Checking,
            IceConnectionState::Disconnected,
        ] {
            assert_eq!(state.to_string().parse::<IceConnectionState>().unwrap(), state);
        }
    }

    #[test]
    fn parse_unknown() {
        assert!(matches!(
            "gathering".parse::<IceConnectionState>(),
            Err(Error::IceConnectionStateUnknown { value: _ }),
        ));
    }

    #[test]
    fn connected_states() {
        assert!(IceConnectionState::Completed.is_connected());
        assert!(!IceConnectionState::Checking.is_connected());
    }
}
