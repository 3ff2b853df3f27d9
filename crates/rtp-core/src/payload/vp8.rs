//! VP8 payload format handler
//!
//! Implements the receive side of RFC 7741: parsing the VP8 payload
//! descriptor that prefixes every RTP payload and locating frame boundaries.

use bytes::Bytes;

use super::Depacketizer;
use crate::error::Error;
use crate::time::clock_rates::VIDEO_90KHZ;
use crate::Result;

/// Extended control bits present
const X_BIT: u8 = 0x80;
/// Start of VP8 partition
const S_BIT: u8 = 0x10;
/// Partition index mask
const PID_MASK: u8 = 0x07;
/// PictureID present
const I_BIT: u8 = 0x80;
/// TL0PICIDX present
const L_BIT: u8 = 0x40;
/// TID present
const T_BIT: u8 = 0x20;
/// KEYIDX present
const K_BIT: u8 = 0x10;
/// 15-bit PictureID
const M_BIT: u8 = 0x80;

/// Parsed VP8 payload descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vp8Descriptor {
    /// Start of a VP8 partition
    pub start_of_partition: bool,
    /// Partition index
    pub partition_id: u8,
    /// PictureID, when present
    pub picture_id: Option<u16>,
    /// Temporal level zero index, when present
    pub tl0_pic_idx: Option<u8>,
    /// Size of the descriptor in bytes
    pub size: usize,
}

impl Vp8Descriptor {
    /// Parse the descriptor at the start of an RTP payload
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let first = *payload.first().ok_or_else(|| {
            Error::PayloadError("Empty VP8 payload".to_string())
        })?;

        let mut descriptor = Vp8Descriptor {
            start_of_partition: first & S_BIT != 0,
            partition_id: first & PID_MASK,
            size: 1,
            ..Default::default()
        };

        if first & X_BIT != 0 {
            let ext = byte_at(payload, 1)?;
            descriptor.size = 2;

            if ext & I_BIT != 0 {
                let pic = byte_at(payload, descriptor.size)?;
                if pic & M_BIT != 0 {
                    let low = byte_at(payload, descriptor.size + 1)?;
                    descriptor.picture_id = Some((((pic & 0x7F) as u16) << 8) | low as u16);
                    descriptor.size += 2;
                } else {
                    descriptor.picture_id = Some(pic as u16);
                    descriptor.size += 1;
                }
            }

            if ext & L_BIT != 0 {
                descriptor.tl0_pic_idx = Some(byte_at(payload, descriptor.size)?);
                descriptor.size += 1;
            }

            if ext & (T_BIT | K_BIT) != 0 {
                byte_at(payload, descriptor.size)?;
                descriptor.size += 1;
            }
        }

        if descriptor.size >= payload.len() {
            return Err(Error::PayloadError(format!(
                "VP8 payload carries no data after a {} byte descriptor",
                descriptor.size
            )));
        }

        Ok(descriptor)
    }

    /// Whether this packet carries the first bytes of a frame
    pub fn is_frame_start(&self) -> bool {
        self.start_of_partition && self.partition_id == 0
    }
}

fn byte_at(payload: &[u8], index: usize) -> Result<u8> {
    payload.get(index).copied().ok_or(Error::BufferTooSmall {
        required: index + 1,
        available: payload.len(),
    })
}

/// Whether a depacketized frame (starting at the VP8 payload header) is a keyframe
///
/// The P bit of the first byte is 0 for keyframes (RFC 6386 Section 9.1).
pub fn is_keyframe(frame: &[u8]) -> bool {
    frame.first().map(|b| b & 0x01 == 0).unwrap_or(false)
}

/// VP8 depacketizer
#[derive(Debug, Clone, Default)]
pub struct Vp8Depacketizer;

impl Vp8Depacketizer {
    pub fn new() -> Self {
        Self
    }

    /// Depacketize and report whether the payload starts a frame
    pub fn depacketize_with_descriptor(&self, payload: &Bytes) -> Result<(Vp8Descriptor, Bytes)> {
        let descriptor = Vp8Descriptor::parse(payload)?;
        Ok((descriptor, payload.slice(descriptor.size..)))
    }
}

impl Depacketizer for Vp8Depacketizer {
    fn depacketize(&self, payload: &Bytes) -> Result<Bytes> {
        self.depacketize_with_descriptor(payload).map(|(_, data)| data)
    }

    fn is_partition_head(&self, payload: &[u8]) -> bool {
        payload
            .first()
            .map(|b| b & S_BIT != 0 && b & PID_MASK == 0)
            .unwrap_or(false)
    }

    fn is_partition_tail(&self, marker: bool, _payload: &[u8]) -> bool {
        marker
    }

    fn clock_rate(&self) -> u32 {
        VIDEO_90KHZ
    }
}
