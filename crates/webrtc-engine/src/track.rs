//! Adapters between webrtc-rs tracks and the media-core boundary traits

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::debug;
use webrtc::media::Sample as RtcSample;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtcp::packet::Packet as RtcpPacket;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication as RtcPli;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

use rtpbridge_media_core::{ControlSender, Error as MediaError, PacketReader, Sample, SampleSink};
use rtpbridge_rtp_core::{PictureLossIndication, RtpPacket};

/// Outbound VP8 track fed with relayed samples
pub struct OutboundSampleTrack {
    track: Arc<TrackLocalStaticSample>,
}

impl OutboundSampleTrack {
    pub fn new(track: Arc<TrackLocalStaticSample>) -> Self {
        Self { track }
    }
}

#[async_trait]
impl SampleSink for OutboundSampleTrack {
    async fn write_sample(&self, sample: Sample) -> rtpbridge_media_core::Result<()> {
        let rtc_sample = RtcSample {
            data: sample.data,
            duration: sample.duration,
            packet_timestamp: sample.timestamp,
            prev_dropped_packets: sample.prev_dropped_packets.min(u16::MAX as u32) as u16,
            ..Default::default()
        };
        self.track
            .write_sample(&rtc_sample)
            .await
            .map_err(|e| MediaError::SampleWrite(e.to_string()))
    }
}

/// Reads RTP from a remote track
pub struct RemoteTrackReader {
    track: Arc<TrackRemote>,
}

impl RemoteTrackReader {
    pub fn new(track: Arc<TrackRemote>) -> Self {
        Self { track }
    }
}

#[async_trait]
impl PacketReader for RemoteTrackReader {
    async fn read_packet(&mut self) -> rtpbridge_media_core::Result<Option<RtpPacket>> {
        match self.track.read_rtp().await {
            Ok((packet, _attributes)) => {
                let header = &packet.header;
                let mut converted = RtpPacket::new_with_payload(
                    header.payload_type,
                    header.sequence_number,
                    header.timestamp,
                    header.ssrc,
                    packet.payload.clone(),
                );
                converted.header.marker = header.marker;
                Ok(Some(converted))
            }
            Err(webrtc::Error::ErrClosedPipe) | Err(webrtc::Error::ErrConnectionClosed) => {
                debug!("Remote track ssrc={} closed", self.track.ssrc());
                Ok(None)
            }
            Err(e) => Err(MediaError::TrackRead(e.to_string())),
        }
    }
}

/// Sends PLIs over the peer connection's RTCP path
pub struct RtcpControl {
    peer: Weak<RTCPeerConnection>,
}

impl RtcpControl {
    pub fn new(peer: Weak<RTCPeerConnection>) -> Self {
        Self { peer }
    }
}

#[async_trait]
impl ControlSender for RtcpControl {
    async fn send_pli(&self, pli: PictureLossIndication) -> rtpbridge_media_core::Result<()> {
        let peer = self
            .peer
            .upgrade()
            .ok_or_else(|| MediaError::Control("peer connection closed".to_string()))?;
        let packets: [Box<dyn RtcpPacket + Send + Sync>; 1] = [Box::new(RtcPli {
            sender_ssrc: pli.sender_ssrc,
            media_ssrc: pli.media_ssrc,
        })];
        peer.write_rtcp(&packets)
            .await
            .map(|_| ())
            .map_err(|e| MediaError::Control(e.to_string()))
    }
}
