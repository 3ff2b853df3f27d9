//! RTP Core library for rtpbridge
//!
//! This crate provides the wire-level pieces the bridge needs to turn raw
//! datagrams into media:
//!
//! - `packet`: RTP packet parsing/serialization and RTCP feedback messages
//! - `payload`: codec depacketizers (VP8 and opaque marker-framed payloads)
//! - `time`: sequence number and timestamp arithmetic

mod error;

pub mod packet;
pub mod payload;
pub mod time;

pub use error::Error;

pub use packet::{RtpHeader, RtpPacket};
pub use packet::rtcp::{PictureLossIndication, RtcpHeader, RtcpPacketType};
pub use payload::{Depacketizer, RawDepacketizer, Vp8Depacketizer};
pub use time::SequenceUnwrapper;

/// Default maximum datagram size read from the media source
pub const DEFAULT_MTU: usize = 8192;

/// Typedef for RTP timestamp values
pub type RtpTimestamp = u32;

/// Typedef for RTP sequence numbers
pub type RtpSequenceNumber = u16;

/// Typedef for RTP synchronization source identifier
pub type RtpSsrc = u32;

/// Typedef for RTP contributing source identifier
pub type RtpCsrc = u32;

/// Result type for RTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::{
        Depacketizer, Error, PictureLossIndication, RawDepacketizer, Result, RtpCsrc,
        RtpHeader, RtpPacket, RtpSequenceNumber, RtpSsrc, RtpTimestamp, SequenceUnwrapper,
        Vp8Depacketizer,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tracing::debug;

    fn init_test_logging() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    }

    #[test]
    fn test_vp8_packet_through_depacketizer() {
        init_test_logging();

        // Descriptor: S=1, PID=0, followed by a keyframe payload header
        let payload = Bytes::from_static(&[0x10, 0x9c, 0x01, 0x2a]);
        let packet = RtpPacket::new_with_payload(96, 7, 3000, 0x1234, payload);
        let wire = packet.serialize().unwrap();
        debug!("Serialized VP8 packet: {} bytes", wire.len());

        let parsed = RtpPacket::parse(&wire).unwrap();
        let vp8 = Vp8Depacketizer::new();
        assert!(vp8.is_partition_head(&parsed.payload));

        let frame = vp8.depacketize(&parsed.payload).unwrap();
        assert_eq!(frame.as_ref(), &[0x9c, 0x01, 0x2a]);
        assert!(payload::vp8::is_keyframe(&frame));
    }
}
