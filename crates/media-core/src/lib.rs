//! Media pipelines for rtpbridge
//!
//! This crate turns a raw RTP stream into samples for an outbound track and
//! captures an inbound track to disk:
//!
//! - `sample`: reordering and reassembly of RTP packets into samples
//! - `relay`: the UDP source → sample builder → outbound track loop
//! - `capture`: inbound track → container loop and the keyframe request timer
//! - `container`: IVF file writer
//! - `sync`: the readiness barrier ordering capture start before relay start
//! - `track`: traits at the boundary with the negotiated session

mod error;

pub mod capture;
pub mod container;
pub mod relay;
pub mod sample;
pub mod sync;
pub mod track;

use std::time::Duration;

pub use error::{Error, Result};

pub use capture::{CaptureLoop, CaptureStats, KeyframeTimer};
pub use container::IvfWriter;
pub use relay::{ReadErrorPolicy, RelayConfig, RelayLoop, RelayStats};
pub use sample::{Sample, SampleBuilder};
pub use sync::{readiness_barrier, ReadySignal, ReadyWait};
pub use track::{ContainerWriter, ControlSender, PacketReader, SampleSink};

/// Duration of the first sample of a stream (one frame at 30 fps)
pub const DEFAULT_FRAME_DURATION: Duration = Duration::from_micros(33_333);

pub mod prelude {
    pub use crate::{
        readiness_barrier, CaptureLoop, ContainerWriter, ControlSender, Error, IvfWriter,
        KeyframeTimer, PacketReader, ReadErrorPolicy, RelayConfig, RelayLoop, RelayStats, Result,
        Sample, SampleBuilder, SampleSink,
    };
}
