//! RTP Packet module
//!
//! Structures for RTP packets as defined in RFC 3550 and the RTCP
//! feedback messages the bridge sends back to remote encoders.

pub mod rtp;
pub mod rtcp;

pub use rtp::*;

/// Format a byte slice as space separated hex, for trace logging
pub fn hex_dump(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
