mod candidate;
mod description;
mod error;
mod ice;
mod policy;

pub use candidate::Candidate;
pub use description::{Description, DescriptionKind};
pub use error::{Error, Result};
pub use ice::IceConnectionState;
pub use policy::{
    BundlePolicy, Constraint, IceServer, KeyType, MediaConstraints, RtcConfiguration,
    RtcpMuxPolicy, SignalingParameters, TcpCandidatePolicy,
};
