//! RTCP Packet module
//!
//! The bridge only ever sends one kind of RTCP message, a payload-specific
//! feedback Picture Loss Indication (RFC 4585), so this module carries the
//! common RTCP header and that message.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::Error;
use crate::Result;

mod feedback;

pub use feedback::PictureLossIndication;

/// RTCP version (same as RTP, always 2)
pub const RTCP_VERSION: u8 = 2;

/// Size of the common RTCP header in bytes
pub const RTCP_HEADER_SIZE: usize = 4;

/// RTCP packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RtcpPacketType {
    /// Sender Report (SR)
    SenderReport = 200,

    /// Receiver Report (RR)
    ReceiverReport = 201,

    /// Source Description (SDES)
    SourceDescription = 202,

    /// Goodbye (BYE)
    Goodbye = 203,

    /// Application-Defined (APP)
    ApplicationDefined = 204,

    /// Transport layer feedback (RFC 4585)
    TransportFeedback = 205,

    /// Payload-specific feedback (RFC 4585)
    PayloadSpecificFeedback = 206,
}

impl TryFrom<u8> for RtcpPacketType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            200 => Ok(RtcpPacketType::SenderReport),
            201 => Ok(RtcpPacketType::ReceiverReport),
            202 => Ok(RtcpPacketType::SourceDescription),
            203 => Ok(RtcpPacketType::Goodbye),
            204 => Ok(RtcpPacketType::ApplicationDefined),
            205 => Ok(RtcpPacketType::TransportFeedback),
            206 => Ok(RtcpPacketType::PayloadSpecificFeedback),
            _ => Err(Error::RtcpError(format!("Unknown RTCP packet type: {}", value))),
        }
    }
}

/// Common RTCP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcpHeader {
    /// Padding flag
    pub padding: bool,

    /// Report count, or feedback message type (FMT) for feedback packets
    pub count: u8,

    /// Packet type
    pub packet_type: RtcpPacketType,

    /// Length in 32-bit words minus one
    pub length: u16,
}

impl RtcpHeader {
    /// Parse the common header
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < RTCP_HEADER_SIZE {
            return Err(Error::BufferTooSmall {
                required: RTCP_HEADER_SIZE,
                available: buf.remaining(),
            });
        }

        let first_byte = buf.get_u8();
        let version = first_byte >> 6;
        if version != RTCP_VERSION {
            return Err(Error::RtcpError(format!("Invalid RTCP version: {}", version)));
        }

        let padding = (first_byte >> 5) & 0x01 == 1;
        let count = first_byte & 0x1F;
        let packet_type = RtcpPacketType::try_from(buf.get_u8())?;
        let length = buf.get_u16();

        Ok(Self { padding, count, packet_type, length })
    }

    /// Serialize the common header
    pub fn serialize(&self, buf: &mut BytesMut) {
        let mut first_byte = RTCP_VERSION << 6;
        if self.padding {
            first_byte |= 1 << 5;
        }
        first_byte |= self.count & 0x1F;

        buf.put_u8(first_byte);
        buf.put_u8(self.packet_type as u8);
        buf.put_u16(self.length);
    }

    /// Body length in bytes, as announced by the length field
    pub fn body_len(&self) -> usize {
        self.length as usize * 4
    }
}
