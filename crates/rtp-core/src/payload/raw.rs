//! Opaque payloads framed only by the RTP marker bit

use bytes::Bytes;

use super::Depacketizer;
use crate::Result;

/// Depacketizer for payloads without a descriptor
///
/// Every packet may open a frame; the marker bit closes it. Useful for
/// codecs that put one frame in each packet and for tests.
#[derive(Debug, Clone)]
pub struct RawDepacketizer {
    clock_rate: u32,
}

impl RawDepacketizer {
    pub fn new(clock_rate: u32) -> Self {
        Self { clock_rate }
    }
}

impl Default for RawDepacketizer {
    fn default() -> Self {
        Self::new(crate::time::clock_rates::VIDEO_90KHZ)
    }
}

impl Depacketizer for RawDepacketizer {
    fn depacketize(&self, payload: &Bytes) -> Result<Bytes> {
        Ok(payload.clone())
    }

    fn is_partition_head(&self, _payload: &[u8]) -> bool {
        true
    }

    fn is_partition_tail(&self, marker: bool, _payload: &[u8]) -> bool {
        marker
    }

    fn clock_rate(&self) -> u32 {
        self.clock_rate
    }
}
