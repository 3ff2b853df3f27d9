//! Error types for media-core

use thiserror::Error;

/// Result type for media-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the relay and capture pipelines
#[derive(Error, Debug)]
pub enum Error {
    /// Reading from the media source socket failed
    #[error("Transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// A packet could not be parsed or serialized
    #[error("Packet error: {0}")]
    Packet(#[from] rtpbridge_rtp_core::Error),

    /// Writing a sample to the outbound track failed
    #[error("Sample write failed: {0}")]
    SampleWrite(String),

    /// Reading from an inbound track failed
    #[error("Track read failed: {0}")]
    TrackRead(String),

    /// Sending an RTCP control message failed
    #[error("Control send failed: {0}")]
    Control(String),

    /// The container writer failed; captured data may be lost
    #[error("Container error: {0}")]
    Container(String),

    /// The readiness signal was dropped without being raised
    #[error("Readiness barrier broken: signal dropped before capture started")]
    BarrierBroken,

    /// Invalid relay or capture configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether this is a transport error that means the source has no more data
    pub fn is_end_of_stream(&self) -> bool {
        matches!(
            self,
            Error::Transport(e) if e.kind() == std::io::ErrorKind::UnexpectedEof
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(err)
    }
}
