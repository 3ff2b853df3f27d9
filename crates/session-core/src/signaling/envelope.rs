//! Base64-of-JSON session description envelope
//!
//! Offers and answers travel as `base64(json({"type": ..., "sdp": ...}))`.

use std::fmt;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SdpType::Offer => "offer",
            SdpType::Pranswer => "pranswer",
            SdpType::Answer => "answer",
            SdpType::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { sdp_type: SdpType::Offer, sdp: sdp.into() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { sdp_type: SdpType::Answer, sdp: sdp.into() }
    }
}

/// Encode a description with the standard base64 alphabet
pub fn encode_description(description: &SessionDescription) -> Result<String> {
    let json = serde_json::to_vec(description)
        .map_err(|e| SessionError::negotiation(format!("failed to serialize description: {}", e)))?;
    Ok(STANDARD.encode(json))
}

/// Decode a description; the URL-safe alphabet and unpadded input are accepted too
pub fn decode_description(encoded: &str) -> Result<SessionDescription> {
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return Err(SessionError::malformed_offer("empty payload"));
    }

    let json = [&STANDARD, &URL_SAFE, &STANDARD_NO_PAD, &URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(encoded).ok())
        .ok_or_else(|| SessionError::malformed_offer("payload is not valid base64"))?;

    serde_json::from_slice(&json)
        .map_err(|e| SessionError::malformed_offer(format!("payload is not a session description: {}", e)))
}
