//! Offer/answer signaling: the wire envelope and the one-shot handoff

pub mod envelope;
pub mod handoff;

pub use envelope::{decode_description, encode_description, SdpType, SessionDescription};
pub use handoff::{IncomingOffer, OfferReceiver, OfferSubmitter, SignalingHandoff};
