//! Reconstructed media samples
//!
//! A [`Sample`] is one coded frame reassembled from the RTP packets that
//! carried it. [`SampleBuilder`] does the reassembly.

mod builder;

pub use builder::{SampleBuilder, SampleBuilderStats};

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use rtpbridge_rtp_core::{RtpSequenceNumber, RtpTimestamp};

/// One complete media unit, ready for an outbound track
#[derive(Clone, PartialEq, Eq)]
pub struct Sample {
    /// Depacketized codec bitstream
    pub data: Bytes,

    /// RTP timestamp shared by all packets of the unit
    pub timestamp: RtpTimestamp,

    /// Playout duration of this sample
    pub duration: Duration,

    /// Sequence number of the first packet
    pub sequence_start: RtpSequenceNumber,

    /// Sequence number of the last packet
    pub sequence_end: RtpSequenceNumber,

    /// Packets lost or discarded between the previous sample and this one
    pub prev_dropped_packets: u32,

    /// Number of packets merged into this sample
    pub packet_count: usize,
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("len", &self.data.len())
            .field("timestamp", &self.timestamp)
            .field("duration", &self.duration)
            .field("sequence_start", &self.sequence_start)
            .field("sequence_end", &self.sequence_end)
            .field("prev_dropped_packets", &self.prev_dropped_packets)
            .field("packet_count", &self.packet_count)
            .finish()
    }
}
