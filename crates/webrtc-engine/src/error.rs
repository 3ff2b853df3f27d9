use thiserror::Error;

use rtpbridge_session_core::SessionError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("Invalid SDP: {0}")]
    InvalidSdp(String),

    #[error("ICE gathering did not complete")]
    GatheringIncomplete,

    #[error("Peer connection closed")]
    Closed,
}

impl From<Error> for SessionError {
    fn from(err: Error) -> Self {
        SessionError::negotiation(err.to_string())
    }
}
