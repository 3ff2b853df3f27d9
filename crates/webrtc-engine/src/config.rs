use serde::{Deserialize, Serialize};

/// Payload type browsers usually offer VP8 at
pub const DEFAULT_VP8_PAYLOAD_TYPE: u8 = 96;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    /// STUN/TURN urls
    pub ice_servers: Vec<String>,
    pub vp8_payload_type: u8,
    /// Stream id of the outbound track
    pub stream_id: String,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            vp8_payload_type: DEFAULT_VP8_PAYLOAD_TYPE,
            stream_id: "rtpbridge".to_string(),
        }
    }
}
