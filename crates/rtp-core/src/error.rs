use thiserror::Error;

/// Error type for RTP operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid packet format
    #[error("Invalid RTP packet format: {0}")]
    InvalidPacket(String),

    /// Buffer too small
    #[error("Buffer too small for RTP packet: need {required} but have {available}")]
    BufferTooSmall {
        required: usize,
        available: usize,
    },

    /// Invalid parameter for RTP operation
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// RTCP error
    #[error("RTCP error: {0}")]
    RtcpError(String),

    /// Payload could not be depacketized
    #[error("Payload error: {0}")]
    PayloadError(String),
}
