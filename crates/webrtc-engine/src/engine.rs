//! [`MediaEngine`] implementation on top of webrtc-rs

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine as RtcMediaEngine, MIME_TYPE_VP8};
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType};
use webrtc::rtp_transceiver::RTCPFeedback;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use rtpbridge_rtp_core::time::clock_rates::VIDEO_90KHZ;
use rtpbridge_session_core::{
    InboundTrack, MediaEngine, NegotiatedSession, PeerSession, SessionDescription, SessionError,
};

use crate::config::WebRtcConfig;
use crate::error::{Error, Result};
use crate::track::{OutboundSampleTrack, RemoteTrackReader, RtcpControl};

/// Inbound tracks buffered between `on_track` and the session
const INBOUND_TRACK_BUFFER: usize = 4;

fn vp8_codec_capability() -> RTCRtpCodecCapability {
    let feedback = |typ: &str, parameter: &str| RTCPFeedback {
        typ: typ.to_string(),
        parameter: parameter.to_string(),
    };
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_VP8.to_string(),
        clock_rate: VIDEO_90KHZ,
        channels: 0,
        sdp_fmtp_line: String::new(),
        rtcp_feedback: vec![
            feedback("goog-remb", ""),
            feedback("ccm", "fir"),
            feedback("nack", ""),
            feedback("nack", "pli"),
        ],
    }
}

/// Build the webrtc-rs API with VP8 at the configured payload type
pub fn build_api(config: &WebRtcConfig) -> Result<API> {
    let mut media_engine = RtcMediaEngine::default();
    media_engine.register_codec(
        RTCRtpCodecParameters {
            capability: vp8_codec_capability(),
            payload_type: config.vp8_payload_type,
            ..Default::default()
        },
        RTPCodecType::Video,
    )?;

    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

/// Negotiates one peer connection per offer
pub struct WebRtcEngine {
    api: API,
    config: WebRtcConfig,
}

impl WebRtcEngine {
    pub fn new(config: WebRtcConfig) -> Result<Self> {
        let api = build_api(&config)?;
        info!(
            "WebRTC engine ready: vp8 pt={} ice_servers={:?}",
            config.vp8_payload_type, config.ice_servers
        );
        Ok(Self { api, config })
    }

    fn rtc_configuration(&self) -> RTCConfiguration {
        let ice_servers = if self.config.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.config.ice_servers.clone(),
                ..Default::default()
            }]
        };
        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }

    async fn negotiate_peer(&self, offer: SessionDescription) -> Result<NegotiatedSession> {
        let pc = Arc::new(self.api.new_peer_connection(self.rtc_configuration()).await?);

        match self.prepare(&pc, offer).await {
            Ok(session) => Ok(session),
            Err(e) => {
                if let Err(close_err) = pc.close().await {
                    debug!("Closing failed peer connection: {}", close_err);
                }
                Err(e)
            }
        }
    }

    async fn prepare(&self, pc: &Arc<RTCPeerConnection>, offer: SessionDescription) -> Result<NegotiatedSession> {
        let outbound = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_string(),
                ..Default::default()
            },
            "video".to_string(),
            self.config.stream_id.clone(),
        ));
        let rtp_sender = pc
            .add_track(Arc::clone(&outbound) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        // Incoming RTCP must be read for interceptors such as NACK to work
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while rtp_sender.read(&mut rtcp_buf).await.is_ok() {}
            debug!("Outbound RTCP reader stopped");
        });

        let (track_tx, track_rx) = mpsc::channel(INBOUND_TRACK_BUFFER);
        let weak_pc = Arc::downgrade(pc);
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let track_tx = track_tx.clone();
            let control = Arc::new(RtcpControl::new(weak_pc.clone()));
            Box::pin(async move {
                let codec = track.codec();
                let inbound = InboundTrack {
                    ssrc: track.ssrc(),
                    mime_type: codec.capability.mime_type.clone(),
                    payload_type: track.payload_type(),
                    reader: Box::new(RemoteTrackReader::new(track)),
                    control,
                };
                if track_tx.send(inbound).await.is_err() {
                    debug!("Session no longer accepts inbound tracks");
                }
            })
        }));

        pc.on_ice_connection_state_change(Box::new(|state: RTCIceConnectionState| {
            info!("ICE connection state changed: {}", state);
            Box::pin(async {})
        }));
        pc.on_peer_connection_state_change(Box::new(|state: RTCPeerConnectionState| {
            match state {
                RTCPeerConnectionState::Failed | RTCPeerConnectionState::Disconnected => {
                    warn!("Peer connection state changed: {}", state)
                }
                _ => info!("Peer connection state changed: {}", state),
            }
            Box::pin(async {})
        }));

        let remote = RTCSessionDescription::offer(offer.sdp).map_err(|e| Error::InvalidSdp(e.to_string()))?;
        pc.set_remote_description(remote).await?;

        let answer = pc.create_answer(None).await?;
        let mut gather_complete = pc.gathering_complete_promise().await;
        pc.set_local_description(answer).await?;
        // The exchange is one-shot, so the answer must carry every candidate
        let _ = gather_complete.recv().await;

        let local = pc.local_description().await.ok_or(Error::GatheringIncomplete)?;
        debug!("Local description ready ({} bytes)", local.sdp.len());

        Ok(NegotiatedSession {
            answer: SessionDescription::answer(local.sdp),
            outbound: Arc::new(OutboundSampleTrack::new(outbound)),
            inbound: track_rx,
            peer: Arc::new(WebRtcPeer { pc: Arc::clone(pc) }),
        })
    }
}

#[async_trait]
impl MediaEngine for WebRtcEngine {
    async fn negotiate(&self, offer: SessionDescription) -> rtpbridge_session_core::Result<NegotiatedSession> {
        self.negotiate_peer(offer).await.map_err(SessionError::from)
    }
}

struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerSession for WebRtcPeer {
    async fn close(&self) -> rtpbridge_session_core::Result<()> {
        self.pc.close().await.map_err(|e| SessionError::from(Error::from(e)))
    }
}
