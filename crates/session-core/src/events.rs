//! Session lifecycle events published on the coordinator's broadcast channel

use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use rtpbridge_media_core::RelayStats;
use rtpbridge_rtp_core::RtpSsrc;

use crate::coordinator::SessionId;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The answer was handed back to the requester
    Negotiated {
        session_id: SessionId,
        at: DateTime<Utc>,
    },
    /// A capture loop is consuming an inbound track
    CaptureStarted {
        session_id: SessionId,
        ssrc: RtpSsrc,
        path: PathBuf,
    },
    /// The relay bound its UDP listener
    RelayListening {
        session_id: SessionId,
        addr: SocketAddr,
        at: DateTime<Utc>,
    },
    /// The session ended normally
    Terminated {
        session_id: SessionId,
        stats: Option<RelayStats>,
        at: DateTime<Utc>,
    },
    Failed {
        session_id: SessionId,
        error: String,
        at: DateTime<Utc>,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            SessionEvent::Negotiated { session_id, .. }
            | SessionEvent::CaptureStarted { session_id, .. }
            | SessionEvent::RelayListening { session_id, .. }
            | SessionEvent::Terminated { session_id, .. }
            | SessionEvent::Failed { session_id, .. } => *session_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Terminated { .. } | SessionEvent::Failed { .. })
    }
}
