//! Capture of an inbound track into a container
//!
//! [`CaptureLoop`] appends every packet read from the inbound track to a
//! [`ContainerWriter`] in arrival order. [`KeyframeTimer`] runs beside it
//! and keeps asking the remote encoder for keyframes.

mod keyframe;

pub use keyframe::{KeyframeStats, KeyframeTimer, DEFAULT_KEYFRAME_INTERVAL};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::sync::ReadySignal;
use crate::track::{ContainerWriter, PacketReader};

/// Why a capture loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureEnd {
    /// The inbound track ended
    TrackEnded,
    /// The session was cancelled
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    pub packets_written: u64,
    pub ended_by: CaptureEnd,
}

/// Reads an inbound track and writes its packets to a container
pub struct CaptureLoop<R, W> {
    reader: R,
    writer: W,
}

impl<R: PacketReader, W: ContainerWriter> CaptureLoop<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Run until the track ends, a read or write fails, or `cancel` fires.
    ///
    /// `ready` is raised as soon as the loop starts, before any packet has
    /// necessarily arrived. The writer is closed on every exit path.
    pub async fn run(mut self, ready: ReadySignal, cancel: CancellationToken) -> Result<CaptureStats> {
        ready.signal();
        debug!("Capture loop started");

        let mut packets_written = 0u64;
        let outcome = loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(CaptureEnd::Cancelled),
                read = self.reader.read_packet() => read,
            };

            match read {
                Ok(Some(packet)) => {
                    if let Err(e) = self.writer.append_packet(&packet) {
                        error!("Container write failed at seq={}: {}", packet.sequence_number(), e);
                        break Err(e);
                    }
                    packets_written += 1;
                }
                Ok(None) => break Ok(CaptureEnd::TrackEnded),
                Err(e) => {
                    warn!("Inbound track read failed: {}", e);
                    break Err(e);
                }
            }
        };

        let closed = self.writer.close();
        if let (Err(_), Err(close_err)) = (&outcome, &closed) {
            warn!("Failed to close container after capture error: {}", close_err);
        }

        let ended_by = outcome?;
        closed?;

        info!("Capture finished after {} packets ({:?})", packets_written, ended_by);
        Ok(CaptureStats { packets_written, ended_by })
    }
}
