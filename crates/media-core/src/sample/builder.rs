//! Sample reconstruction from unordered RTP packets
//!
//! The builder keeps a bounded window of packets keyed by extended sequence
//! number. Packets older than the window are dropped, never merged back in.
//! A sample is emitted once a contiguous run starting at a partition head is
//! closed, either by a partition tail (marker bit) or by a following packet
//! that starts a new frame. A hole anywhere before that run holds back
//! popping until the window slides past it.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::time::Duration;

use bytes::BytesMut;
use serde::Serialize;
use tracing::{debug, trace, warn};

use rtpbridge_rtp_core::time::{rtp_timestamp_delta, rtp_timestamp_to_duration};
use rtpbridge_rtp_core::{Depacketizer, RtpPacket, RtpTimestamp, SequenceUnwrapper};

use super::Sample;
use crate::DEFAULT_FRAME_DURATION;

/// Counters kept by a [`SampleBuilder`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SampleBuilderStats {
    /// Packets handed to `push`
    pub packets_pushed: u64,
    /// Packets ignored because their sequence slot was already filled
    pub duplicates: u64,
    /// Packets older than the window low edge
    pub stale_dropped: u64,
    /// Packets pushed out of the window before they could be used
    pub evicted: u64,
    /// Packets skipped because no frame start preceded them
    pub discarded: u64,
    /// Samples returned by `pop`
    pub samples_built: u64,
    /// Units thrown away because the depacketizer rejected a payload
    pub depacketize_failures: u64,
}

/// Reorders RTP packets of one codec and reassembles them into samples
pub struct SampleBuilder<D> {
    depacketizer: D,
    capacity: u64,
    clock_rate: u32,
    default_frame_duration: Duration,

    packets: BTreeMap<u64, RtpPacket>,
    unwrapper: SequenceUnwrapper,

    /// Extended sequence number following the last popped sample
    next_pop: Option<u64>,
    last_timestamp: Option<RtpTimestamp>,

    stats: SampleBuilderStats,
}

impl<D: Depacketizer> SampleBuilder<D> {
    /// Create a builder holding at most `capacity` packets
    pub fn new(depacketizer: D, capacity: usize) -> Self {
        let clock_rate = depacketizer.clock_rate();
        Self {
            depacketizer,
            capacity: capacity.max(1) as u64,
            clock_rate,
            default_frame_duration: DEFAULT_FRAME_DURATION,
            packets: BTreeMap::new(),
            unwrapper: SequenceUnwrapper::new(),
            next_pop: None,
            last_timestamp: None,
            stats: SampleBuilderStats::default(),
        }
    }

    /// Override the clock rate used to compute sample durations
    pub fn with_clock_rate(mut self, clock_rate: u32) -> Self {
        self.clock_rate = clock_rate;
        self
    }

    /// Duration reported for the first sample, which has no predecessor
    pub fn with_default_frame_duration(mut self, duration: Duration) -> Self {
        self.default_frame_duration = duration;
        self
    }

    /// Insert a packet into the window. Never blocks.
    pub fn push(&mut self, packet: RtpPacket) {
        self.stats.packets_pushed += 1;

        let seq = packet.sequence_number();
        let extended = self.unwrapper.unwrap(seq);

        if extended < self.low_edge() {
            self.stats.stale_dropped += 1;
            trace!("Dropping stale packet seq={} (low edge {})", seq, self.low_edge());
            return;
        }

        match self.packets.entry(extended) {
            Entry::Occupied(_) => {
                self.stats.duplicates += 1;
                trace!("Ignoring duplicate packet seq={}", seq);
            }
            Entry::Vacant(slot) => {
                slot.insert(packet);
            }
        }

        self.evict();
    }

    /// Assemble the oldest complete sample, if one is ready. Never blocks.
    pub fn pop(&mut self) -> Option<Sample> {
        let (&front, _) = self.packets.first_key_value()?;

        let base = self.next_pop.map_or(front, |next| next.min(front));
        let (start, end) = self.complete_range(base)?;

        let remaining = self.packets.split_off(&(end + 1));
        let taken = std::mem::replace(&mut self.packets, remaining);
        self.next_pop = Some(end + 1);

        let discarded = taken.range(..start).count() as u64;
        if discarded > 0 {
            self.stats.discarded += discarded;
            debug!("Discarded {} packets preceding a frame start", discarded);
        }

        let mut data = BytesMut::new();
        for packet in taken.range(start..=end).map(|(_, p)| p) {
            match self.depacketizer.depacketize(&packet.payload) {
                Ok(chunk) => data.extend_from_slice(&chunk),
                Err(e) => {
                    self.stats.depacketize_failures += 1;
                    warn!(
                        "Dropping unit seq={}..{}: depacketize failed on seq={}: {}",
                        start, end, packet.sequence_number(), e
                    );
                    return None;
                }
            }
        }

        let head = taken.get(&start)?;
        let tail = taken.get(&end)?;
        let timestamp = head.timestamp();

        let duration = match self.last_timestamp {
            Some(previous) => {
                let delta = rtp_timestamp_delta(previous, timestamp);
                if delta == 0 || delta >= 0x8000_0000 {
                    self.default_frame_duration
                } else {
                    rtp_timestamp_to_duration(delta, self.clock_rate)
                }
            }
            None => self.default_frame_duration,
        };
        self.last_timestamp = Some(timestamp);
        self.stats.samples_built += 1;

        Some(Sample {
            data: data.freeze(),
            timestamp,
            duration,
            sequence_start: head.sequence_number(),
            sequence_end: tail.sequence_number(),
            prev_dropped_packets: (start - base) as u32,
            packet_count: (end - start + 1) as usize,
        })
    }

    /// Number of packets currently held
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn stats(&self) -> SampleBuilderStats {
        self.stats
    }

    /// Lowest extended sequence number the capacity allows to be held
    fn window_start(&self) -> u64 {
        self.unwrapper
            .highest()
            .map(|highest| (highest + 1).saturating_sub(self.capacity))
            .unwrap_or(0)
    }

    /// Packets below this are dropped on arrival
    fn low_edge(&self) -> u64 {
        self.window_start().max(self.next_pop.unwrap_or(0))
    }

    fn evict(&mut self) {
        let start = self.window_start();
        let overflow = self
            .packets
            .first_key_value()
            .map(|(&key, _)| key < start)
            .unwrap_or(false);

        if overflow {
            let kept = self.packets.split_off(&start);
            let evicted = std::mem::replace(&mut self.packets, kept);
            self.stats.evicted += evicted.len() as u64;
            debug!("Evicted {} packets that fell out of the window", evicted.len());
        }
    }

    /// First run of packets forming a complete unit, as an inclusive key range.
    ///
    /// Keys are walked from `base`. A gap that is still inside the window
    /// holds back popping; a gap below it can never be filled and is passed.
    fn complete_range(&self, base: u64) -> Option<(u64, u64)> {
        let window_start = self.window_start();
        let mut expected = base;
        // (first key, last key, timestamp) of the run being walked
        let mut run: Option<(u64, u64, RtpTimestamp)> = None;

        for (&key, packet) in &self.packets {
            if key != expected {
                if expected >= window_start {
                    return None;
                }
                run = None;
            }
            expected = key + 1;

            let head = self.depacketizer.is_partition_head(&packet.payload);
            match run {
                Some((start, last, timestamp)) => {
                    if head || packet.timestamp() != timestamp {
                        return Some((start, last));
                    }
                    run = Some((start, key, timestamp));
                }
                None if head => run = Some((key, key, packet.timestamp())),
                None => continue,
            }

            if self.depacketizer.is_partition_tail(packet.marker(), &packet.payload) {
                return run.map(|(start, last, _)| (start, last));
            }
        }

        None
    }
}
