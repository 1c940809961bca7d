use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Error;

/// Transport configuration handed to the media engine when a connection is
/// created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcConfiguration {
    pub ice_servers: Vec<IceServer>,
    pub tcp_candidate_policy: TcpCandidatePolicy,
    pub bundle_policy: BundlePolicy,
    pub rtcp_mux_policy: RtcpMuxPolicy,
    pub key_type: KeyType,
    pub enable_dtls_srtp: bool,
}

impl fmt::Display for RtcConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "ice_servers={} tcp_candidates={} bundle={} rtcp_mux={} key={} dtls_srtp={}",
            self.ice_servers.len(),
            self.tcp_candidate_policy,
            self.bundle_policy,
            self.rtcp_mux_policy,
            self.key_type,
            self.enable_dtls_srtp,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.credential = Some(credential.into());
        self
    }
}

/// Parameters obtained from the signaling server for one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingParameters {
    #[serde(default)]
    pub ice_servers: Vec<IceServer>,
}

impl SignalingParameters {
    pub fn new(ice_servers: Vec<IceServer>) -> Self {
        Self { ice_servers }
    }
}

/// Opaque key-value constraints passed through to the media engine, e.g.
/// `OfferToReceiveVideo: true`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    #[serde(default)]
    pub mandatory: Vec<Constraint>,
    #[serde(default)]
    pub optional: Vec<Constraint>,
}

impl MediaConstraints {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mandatory: Vec::new(),
            optional: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_mandatory(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.mandatory.push(Constraint::new(key, value));
        self
    }

    #[must_use]
    pub fn with_optional(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.optional.push(Constraint::new(key, value));
        self
    }

    /// Looks up a constraint, mandatory ones first.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.mandatory
            .iter()
            .chain(self.optional.iter())
            .find(|constraint| constraint.key == key)
            .map(|constraint| constraint.value.as_str())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mandatory.is_empty() && self.optional.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub key: String,
    pub value: String,
}

impl Constraint {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.value)
    }
}

macro_rules! policy_enum {
    ($name:ident, $policy:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $text),)+
                }
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(Error::PolicyValueUnknown {
                        policy: $policy,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

policy_enum!(TcpCandidatePolicy, "tcp candidate policy", {
    Enabled => "enabled",
    Disabled => "disabled",
});

policy_enum!(BundlePolicy, "bundle policy", {
    Balanced => "balanced",
    MaxBundle => "max-bundle",
    MaxCompat => "max-compat",
});

policy_enum!(RtcpMuxPolicy, "rtcp mux policy", {
    Negotiate => "negotiate",
    Require => "require",
});

policy_enum!(KeyType, "key type", {
    Rsa => "rsa",
    Ecdsa => "ecdsa",
});
