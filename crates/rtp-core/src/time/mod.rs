//! Sequence number and clock utilities for RTP
//!
//! RTP sequence numbers are 16 bits and timestamps 32 bits, both wrapping.
//! These helpers compare them modulo wraparound and convert timestamps
//! into wall-clock durations.

use std::time::Duration;

use crate::{RtpSequenceNumber, RtpTimestamp};

/// Convert RTP timestamp units to a duration at a given clock rate
pub fn rtp_timestamp_to_duration(timestamp: u32, clock_rate: u32) -> Duration {
    if clock_rate == 0 {
        return Duration::from_secs(0);
    }

    let seconds = timestamp / clock_rate;
    let remainder = timestamp % clock_rate;
    let nanos = ((remainder as u64) * 1_000_000_000) / (clock_rate as u64);

    Duration::new(seconds as u64, nanos as u32)
}

/// Convert a duration to RTP timestamp units at a given clock rate
pub fn duration_to_rtp_timestamp(duration: Duration, clock_rate: u32) -> u32 {
    let timestamp_seconds = duration.as_secs() * (clock_rate as u64);
    let timestamp_fraction = ((duration.subsec_nanos() as u64) * (clock_rate as u64)) / 1_000_000_000;

    (timestamp_seconds + timestamp_fraction) as u32
}

/// Forward distance from `from` to `to` in timestamp units, modulo 2^32
pub fn rtp_timestamp_delta(from: RtpTimestamp, to: RtpTimestamp) -> u32 {
    to.wrapping_sub(from)
}

/// Absolute distance between two sequence numbers, handling wraparound
pub fn seq_distance(a: RtpSequenceNumber, b: RtpSequenceNumber) -> u16 {
    let forward = b.wrapping_sub(a);
    let backward = a.wrapping_sub(b);
    forward.min(backward)
}

/// Whether `a` is newer than `b` in sequence space (RFC 3550 Appendix A.1 style)
pub fn is_seq_newer(a: RtpSequenceNumber, b: RtpSequenceNumber) -> bool {
    a != b && a.wrapping_sub(b) < 0x8000
}

/// Extends 16-bit sequence numbers into a monotonically comparable 64-bit space
///
/// Each sequence number is placed at the extended value closest to the
/// highest one seen so far, so a stream that wraps from 65535 to 0 keeps
/// increasing and a late packet lands just below the current maximum.
#[derive(Debug, Clone, Default)]
pub struct SequenceUnwrapper {
    highest: Option<u64>,
}

/// Extended value assigned to the first sequence number; leaves room below
/// it for packets that arrive late
const UNWRAP_ORIGIN: u64 = 1 << 32;

impl SequenceUnwrapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extended value of `seq`, updating the highest seen value
    pub fn unwrap(&mut self, seq: RtpSequenceNumber) -> u64 {
        let extended = self.peek(seq);
        if self.highest.map(|h| extended > h).unwrap_or(true) {
            self.highest = Some(extended);
        }
        extended
    }

    /// Extended value of `seq` without recording it
    pub fn peek(&self, seq: RtpSequenceNumber) -> u64 {
        match self.highest {
            None => UNWRAP_ORIGIN + seq as u64,
            Some(highest) => {
                let delta = seq.wrapping_sub(highest as u16) as i16;
                (highest as i64 + delta as i64) as u64
            }
        }
    }

    /// Highest extended sequence number recorded
    pub fn highest(&self) -> Option<u64> {
        self.highest
    }
}

/// Typical clock rates
pub mod clock_rates {
    /// G.711, G.726, G.729 (8kHz)
    pub const AUDIO_8KHZ: u32 = 8000;

    /// Opus (48kHz)
    pub const AUDIO_48KHZ: u32 = 48000;

    /// Video clock rate (90kHz)
    pub const VIDEO_90KHZ: u32 = 90000;
}
