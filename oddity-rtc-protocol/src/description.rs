use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Error;

/// Session description as exchanged with the remote party. The body is
/// opaque SDP text; nothing in this crate looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    #[serde(rename = "type")]
    pub kind: DescriptionKind,
    #[serde(rename = "sdp")]
    pub body: String,
}

impl Description {
    pub fn new(kind: DescriptionKind, body: impl Into<String>) -> Self {
        Self {
            kind,
            body: body.into(),
        }
    }

    pub fn offer(body: impl Into<String>) -> Self {
        Self::new(DescriptionKind::Offer, body)
    }

    pub fn answer(body: impl Into<String>) -> Self {
        Self::new(DescriptionKind::Answer, body)
    }

    #[must_use]
    pub fn is_offer(&self) -> bool {
        self.kind == DescriptionKind::Offer
    }
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.kind, self.body.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptionKind {
    Offer,
    Answer,
}

impl fmt::Display for DescriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Offer => write!(f, "offer"),
            Self::Answer => write!(f, "answer"),
        }
    }
}

impl FromStr for DescriptionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "offer" => Ok(Self::Offer),
            "answer" => Ok(Self::Answer),
            _ => Err(Error::DescriptionKindUnknown {
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {

    use super::{Description, DescriptionKind, Error};

    #[test]
    fn parse_kind() {
        assert_eq!("offer".parse::<DescriptionKind>().unwrap(), DescriptionKind::Offer);
        assert_eq!("ANSWER".parse::<DescriptionKind>().unwrap(), DescriptionKind::Answer);
    }

    #[test]
    fn parse_kind_unknown() {
        assert!(matches!(
            "pranswer".parse::<DescriptionKind>(),
            Err(Error::DescriptionKindUnknown { value: _ }),
        ));
    }

    #[test]
    fn json_uses_signaling_field_names() {
        let description = Description::offer("v=0\r\n");
        let json = serde_json::to_value(&description).unwrap();
        assert_eq!(json["type"], "offer");
        assert_eq!(json["sdp"], "v=0\r\n");
    }

    #[test]
    fn json_from_browser() {
        let description: Description =
            serde_json::from_str(r#"{"type":"answer","sdp":"v=0"}"#).unwrap();
        assert_eq!(description, Description::answer("v=0"));
        assert!(!description.is_offer());
    }
}
