//! WebRTC media engine for rtpbridge
//!
//! Implements the session-core [`MediaEngine`](rtpbridge_session_core::MediaEngine)
//! with webrtc-rs. ICE, DTLS, SRTP and SDP are handled entirely by the
//! `webrtc` crate; this crate only wires its tracks to the media pipelines.

mod config;
mod engine;
mod error;
mod track;

pub use config::{WebRtcConfig, DEFAULT_VP8_PAYLOAD_TYPE};
pub use engine::{build_api, WebRtcEngine};
pub use error::{Error, Result};
pub use track::{OutboundSampleTrack, RemoteTrackReader, RtcpControl};
