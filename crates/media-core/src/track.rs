//! Boundaries between the media pipelines and the negotiated session
//!
//! The relay writes samples into a [`SampleSink`]; the capture loop reads
//! packets from a [`PacketReader`], asks for keyframes through a
//! [`ControlSender`] and stores packets with a [`ContainerWriter`].

use async_trait::async_trait;

use rtpbridge_rtp_core::{PictureLossIndication, RtpPacket};

use crate::error::Result;
use crate::sample::Sample;

/// Outbound track accepting reconstructed samples
#[async_trait]
pub trait SampleSink: Send + Sync {
    async fn write_sample(&self, sample: Sample) -> Result<()>;
}

/// Inbound track delivering RTP packets in arrival order
#[async_trait]
pub trait PacketReader: Send {
    /// Wait for the next packet; `Ok(None)` means the track has ended
    async fn read_packet(&mut self) -> Result<Option<RtpPacket>>;
}

/// RTCP path back to the remote sender
#[async_trait]
pub trait ControlSender: Send + Sync {
    async fn send_pli(&self, pli: PictureLossIndication) -> Result<()>;
}

/// Sequential container output for one track
pub trait ContainerWriter: Send {
    fn append_packet(&mut self, packet: &RtpPacket) -> Result<()>;

    /// Flush and finalize the container
    fn close(&mut self) -> Result<()>;
}

#[async_trait]
impl<R: PacketReader + ?Sized> PacketReader for Box<R> {
    async fn read_packet(&mut self) -> Result<Option<RtpPacket>> {
        (**self).read_packet().await
    }
}
