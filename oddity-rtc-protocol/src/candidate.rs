use std::fmt;

use serde::{Deserialize, Serialize};

use super::Error;

/// One ICE candidate together with the media line it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "sdpMid")]
    pub media_stream_id: String,
    #[serde(rename = "sdpMLineIndex")]
    pub media_line_index: u32,
    #[serde(rename = "candidate")]
    pub candidate: String,
}

impl Candidate {
    pub fn new(
        media_stream_id: impl Into<String>,
        media_line_index: u32,
        candidate: impl Into<String>,
    ) -> Self {
        Self {
            media_stream_id: media_stream_id.into(),
            media_line_index,
            candidate: candidate.into(),
        }
    }

    /// Build a candidate from an SDP attribute line. Accepts both the bare
    /// form (`candidate:...`) and the attribute form (`a=candidate:...`).
    pub fn from_sdp_line(
        media_stream_id: impl Into<String>,
        media_line_index: u32,
        line: &str,
    ) -> Result<Self, Error> {
        let line = line.trim_end_matches(['\r', '\n']);
        let attribute = line.strip_prefix("a=").unwrap_or(line);
        if attribute.starts_with("candidate:") {
            Ok(Self::new(media_stream_id, media_line_index, attribute))
        } else {
            Err(Error::CandidateMalformed {
                line: line.to_string(),
            })
        }
    }

    /// Candidate in its SDP attribute form.
    #[must_use]
    pub fn to_sdp_line(&self) -> String {
        format!("a={}", self.candidate)
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{} {}",
            self.media_stream_id, self.media_line_index, self.candidate
        )
    }
}

#[cfg(test)]
mod tests {

    use super::{Candidate, Error};

    const HOST: &str = "candidate:1 1 udp 2122260223 192.168.1.2 54321 typ host";

    #[test]
    fn from_sdp_line_bare() {
        let candidate = Candidate::from_sdp_line("0", 0, HOST).unwrap();
        assert_eq!(candidate.candidate, HOST);
        assert_eq!(candidate.to_sdp_line(), format!("a={HOST}"));
    }

    #[test]
    fn from_sdp_line_attribute() {
        let line = format!("a={HOST}\r\n");
        let candidate = Candidate::from_sdp_line("audio", 1, &line).unwrap();
        assert_eq!(candidate, Candidate::new("audio", 1, HOST));
    }

    #[test]
    fn from_sdp_line_malformed() {
        assert!(matches!(
            Candidate::from_sdp_line("0", 0, "a=rtcp-mux"),
            Err(Error::CandidateMalformed { line: _ }),
        ));
    }

    #[test]
    fn json_uses_signaling_field_names() {
        let json = serde_json::to_value(Candidate::new("video", 1, HOST)).unwrap();
        assert_eq!(json["sdpMid"], "video");
        assert_eq!(json["sdpMLineIndex"], 1);
        assert_eq!(json["candidate"], HOST);
    }
}
