//! Session layer for rtpbridge
//!
//! Turns one submitted offer into a running session: the signaling handoff
//! carries the offer in and the answer out, the media engine negotiates the
//! peer connection, the first VP8 inbound track is captured, and only then
//! does the relay start forwarding the raw RTP source to the peer.
//!
//! - `signaling`: base64-of-JSON envelope and the one-shot offer handoff
//! - `engine`: the media engine interface
//! - `coordinator`: session table and supervisor
//! - `events`: lifecycle events
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use rtpbridge_session_core::{MediaEngine, SessionConfig, SessionCoordinator};
//! # async fn example(engine: Arc<dyn MediaEngine>, offer: String) -> rtpbridge_session_core::Result<()> {
//! let coordinator = SessionCoordinator::new(SessionConfig::default(), engine)?;
//! let accepted = coordinator.submit_offer(offer).await?;
//! println!("answer for {}: {}", accepted.session_id, accepted.answer);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod errors;
pub mod events;
pub mod signaling;

mod session;

pub use config::{CaptureConfig, SessionConfig};
pub use coordinator::{OfferAccepted, SessionCoordinator, SessionId, SessionInfo, SessionState};
pub use engine::{InboundTrack, MediaEngine, NegotiatedSession, PeerSession, MIME_TYPE_VP8};
pub use errors::{Result, SessionError};
pub use events::SessionEvent;
pub use signaling::{decode_description, encode_description, SdpType, SessionDescription};

pub mod prelude {
    pub use crate::{
        decode_description, encode_description, InboundTrack, MediaEngine, NegotiatedSession,
        OfferAccepted, PeerSession, Result, SdpType, SessionConfig, SessionCoordinator,
        SessionDescription, SessionError, SessionEvent, SessionId,
    };
}
