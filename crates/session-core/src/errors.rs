//! Error types for session-core
//!
//! Every failure here is scoped to one request or one session. Nothing in
//! this crate terminates the process.

use thiserror::Error;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The submitted offer did not decode to a session description offer
    #[error("Malformed offer: {0}")]
    MalformedOffer(String),

    /// The media engine could not produce an answer
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// The single offer/answer exchange has already been serviced
    #[error("Signaling exchange already serviced")]
    AlreadyServiced,

    /// The other side of the handoff went away before answering
    #[error("Signaling handoff closed")]
    HandoffClosed,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Relay or capture failure inside a running session
    #[error("Media error: {0}")]
    Media(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Coordinator is shutting down")]
    ShuttingDown,
}

impl SessionError {
    pub fn malformed_offer(reason: impl Into<String>) -> Self {
        Self::MalformedOffer(reason.into())
    }

    pub fn negotiation(reason: impl Into<String>) -> Self {
        Self::Negotiation(reason.into())
    }

    pub fn session_not_found(session_id: impl ToString) -> Self {
        Self::SessionNotFound(session_id.to_string())
    }

    pub fn media(reason: impl Into<String>) -> Self {
        Self::Media(reason.into())
    }

    pub fn timeout(what: impl Into<String>) -> Self {
        Self::Timeout(what.into())
    }

    /// Caused by the request itself rather than by the server
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MalformedOffer(_) | Self::AlreadyServiced)
    }
}

impl From<rtpbridge_media_core::Error> for SessionError {
    fn from(err: rtpbridge_media_core::Error) -> Self {
        match err {
            rtpbridge_media_core::Error::Config(msg) => Self::ConfigError(msg),
            other => Self::Media(other.to_string()),
        }
    }
}

impl From<rtpbridge_infra_common::Error> for SessionError {
    fn from(err: rtpbridge_infra_common::Error) -> Self {
        match err {
            rtpbridge_infra_common::Error::Internal(_) => Self::ShuttingDown,
            other => Self::ConfigError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_config_errors_stay_config_errors() {
        let err: SessionError = rtpbridge_media_core::Error::Config("bad".into()).into();
        assert_eq!(err, SessionError::ConfigError("bad".into()));

        let err: SessionError = rtpbridge_media_core::Error::BarrierBroken.into();
        assert!(matches!(err, SessionError::Media(_)));
    }

    #[test]
    fn test_client_errors() {
        assert!(SessionError::malformed_offer("x").is_client_error());
        assert!(SessionError::AlreadyServiced.is_client_error());
        assert!(!SessionError::negotiation("x").is_client_error());
    }
}
