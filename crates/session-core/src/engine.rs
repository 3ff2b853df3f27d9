//! Interface to the media engine that negotiates the peer session
//!
//! ICE, DTLS, SRTP and SDP handling live behind [`MediaEngine`]. The session
//! flow only sees the answer, the outbound sample sink and the inbound tracks.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use rtpbridge_media_core::{ControlSender, PacketReader, SampleSink};
use rtpbridge_rtp_core::RtpSsrc;

use crate::errors::Result;
use crate::signaling::SessionDescription;

pub const MIME_TYPE_VP8: &str = "video/VP8";

/// A remote track recognized by the engine
pub struct InboundTrack {
    pub ssrc: RtpSsrc,
    pub mime_type: String,
    pub payload_type: u8,
    pub reader: Box<dyn PacketReader>,
    pub control: Arc<dyn ControlSender>,
}

impl InboundTrack {
    pub fn is_vp8(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case(MIME_TYPE_VP8)
    }
}

impl fmt::Debug for InboundTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundTrack")
            .field("ssrc", &self.ssrc)
            .field("mime_type", &self.mime_type)
            .field("payload_type", &self.payload_type)
            .finish()
    }
}

/// Handle on the negotiated peer connection
#[async_trait]
pub trait PeerSession: Send + Sync {
    async fn close(&self) -> Result<()>;
}

/// Everything a session needs once negotiation succeeded
pub struct NegotiatedSession {
    pub answer: SessionDescription,
    pub outbound: Arc<dyn SampleSink>,
    pub inbound: mpsc::Receiver<InboundTrack>,
    pub peer: Arc<dyn PeerSession>,
}

#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Apply the remote offer and produce a complete local answer
    async fn negotiate(&self, offer: SessionDescription) -> Result<NegotiatedSession>;
}
