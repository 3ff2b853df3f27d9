use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{RtcpHeader, RtcpPacketType, RTCP_HEADER_SIZE};
use crate::error::Error;
use crate::{Result, RtpSsrc};

/// Feedback message type of a PLI inside a payload-specific feedback packet
pub const PLI_FMT: u8 = 1;

/// Total wire size of a PLI: common header plus two SSRCs
const PLI_SIZE: usize = RTCP_HEADER_SIZE + 8;

/// Picture Loss Indication, asking the sender of `media_ssrc` for a keyframe
///
/// Defined in RFC 4585 Section 6.3.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureLossIndication {
    /// SSRC of the packet sender (0 when the sender has no own stream)
    pub sender_ssrc: RtpSsrc,

    /// SSRC of the media source the keyframe is requested from
    pub media_ssrc: RtpSsrc,
}

impl PictureLossIndication {
    /// Create a PLI for a media source
    pub fn new(media_ssrc: RtpSsrc) -> Self {
        Self { sender_ssrc: 0, media_ssrc }
    }

    /// Serialize to wire format
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(PLI_SIZE);

        RtcpHeader {
            padding: false,
            count: PLI_FMT,
            packet_type: RtcpPacketType::PayloadSpecificFeedback,
            length: (PLI_SIZE / 4 - 1) as u16,
        }
        .serialize(&mut buf);

        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);
        buf.freeze()
    }

    /// Parse from wire format
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        let header = RtcpHeader::parse(&mut buf)?;

        if header.packet_type != RtcpPacketType::PayloadSpecificFeedback || header.count != PLI_FMT {
            return Err(Error::RtcpError(format!(
                "Not a picture loss indication: type={:?} fmt={}",
                header.packet_type, header.count
            )));
        }

        if buf.remaining() < 8 || header.body_len() < 8 {
            return Err(Error::BufferTooSmall {
                required: 8,
                available: buf.remaining().min(header.body_len()),
            });
        }

        Ok(Self {
            sender_ssrc: buf.get_u32(),
            media_ssrc: buf.get_u32(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pli_wire_format() {
        let pli = PictureLossIndication::new(0x4a3b2c1d);
        let wire = pli.serialize();

        assert_eq!(wire.len(), 12);
        assert_eq!(
            wire.as_ref(),
            &[0x81, 206, 0x00, 0x02, 0, 0, 0, 0, 0x4a, 0x3b, 0x2c, 0x1d]
        );
        assert_eq!(PictureLossIndication::parse(&wire).unwrap(), pli);
    }

    #[test]
    fn test_parse_rejects_other_feedback() {
        // FIR is FMT 4 of the same packet type
        let mut wire = PictureLossIndication::new(1).serialize().to_vec();
        wire[0] = 0x84;
        assert!(matches!(PictureLossIndication::parse(&wire), Err(Error::RtcpError(_))));

        assert!(matches!(
            PictureLossIndication::parse(&wire[..6]),
            Err(Error::RtcpError(_)) | Err(Error::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn test_parse_truncated() {
        let wire = PictureLossIndication::new(7).serialize();
        assert!(matches!(
            PictureLossIndication::parse(&wire[..8]),
            Err(Error::BufferTooSmall { required: 8, .. })
        ));
    }
}
