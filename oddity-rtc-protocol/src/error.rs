use std::error;
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Description type is neither `offer` nor `answer`.
    DescriptionKindUnknown { value: String },
    /// ICE connection state is not one of the states defined by the
    /// WebRTC specification.
    IceConnectionStateUnknown { value: String },
    /// Candidate line does not start with the `candidate:` attribute
    /// (optionally prefixed with `a=`).
    CandidateMalformed { line: String },
    /// One of the textual policy values is not recognized.
    PolicyValueUnknown { policy: &'static str, value: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::DescriptionKindUnknown { value } => {
                write!(f, "description kind unknown: {value}")
            }
            Error::IceConnectionStateUnknown { value } => {
                write!(f, "ice connection state unknown: {value}")
            }
            Error::CandidateMalformed { line } => write!(f, "candidate malformed: {line}"),
            Error::PolicyValueUnknown { policy, value } => {
                write!(f, "unknown value for {policy}: {value}")
            }
        }
    }
}

impl error::Error for Error {}
