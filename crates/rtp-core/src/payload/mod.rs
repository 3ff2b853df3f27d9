//! Payload depacketizers
//!
//! A depacketizer knows the framing rules of one codec: how to strip the
//! payload descriptor from an RTP payload, and which packets open or close
//! a coded frame. The sample builder in media-core is generic over this trait.

pub mod raw;
pub mod vp8;

pub use raw::RawDepacketizer;
pub use vp8::Vp8Depacketizer;

use bytes::Bytes;

use crate::Result;

/// Codec-specific framing rules for reassembling RTP payloads
pub trait Depacketizer: Send {
    /// Strip the payload descriptor and return the codec bitstream bytes
    fn depacketize(&self, payload: &Bytes) -> Result<Bytes>;

    /// Whether this payload starts a new frame
    fn is_partition_head(&self, payload: &[u8]) -> bool;

    /// Whether this payload completes a frame
    fn is_partition_tail(&self, marker: bool, payload: &[u8]) -> bool;

    /// RTP clock rate of the codec
    fn clock_rate(&self) -> u32;
}

impl<D: Depacketizer + Sync> Depacketizer for std::sync::Arc<D> {
    fn depacketize(&self, payload: &Bytes) -> Result<Bytes> {
        (**self).depacketize(payload)
    }

    fn is_partition_head(&self, payload: &[u8]) -> bool {
        (**self).is_partition_head(payload)
    }

    fn is_partition_tail(&self, marker: bool, payload: &[u8]) -> bool {
        (**self).is_partition_tail(marker, payload)
    }

    fn clock_rate(&self) -> u32 {
        (**self).clock_rate()
    }
}
