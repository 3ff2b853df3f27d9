//! Single-use offer/answer rendezvous
//!
//! The request path calls [`OfferSubmitter::submit`] and stays blocked until
//! the session flow answers through [`IncomingOffer::respond`]. Only one
//! exchange is ever serviced. A second submitter queues behind the first on
//! the exchange lock and, once the first returns, gets
//! [`SessionError::AlreadyServiced`].

use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use crate::errors::{Result, SessionError};

struct PendingOffer {
    encoded: String,
    reply: oneshot::Sender<Result<String>>,
}

pub struct SignalingHandoff;

impl SignalingHandoff {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (OfferSubmitter, OfferReceiver) {
        let (tx, rx) = oneshot::channel();
        let submitter = OfferSubmitter {
            slot: Arc::new(Mutex::new(Some(tx))),
        };
        (submitter, OfferReceiver { rx })
    }
}

/// Request side of the handoff
#[derive(Clone)]
pub struct OfferSubmitter {
    slot: Arc<Mutex<Option<oneshot::Sender<PendingOffer>>>>,
}

impl OfferSubmitter {
    /// Hand an encoded offer to the session flow and wait for the encoded answer
    pub async fn submit(&self, encoded_offer: impl Into<String>) -> Result<String> {
        // Held for the whole exchange so a concurrent submitter waits here.
        let mut slot = self.slot.lock().await;
        let sender = slot.take().ok_or(SessionError::AlreadyServiced)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let pending = PendingOffer {
            encoded: encoded_offer.into(),
            reply: reply_tx,
        };
        sender.send(pending).map_err(|_| SessionError::HandoffClosed)?;
        debug!("Offer handed to session flow, waiting for answer");

        reply_rx.await.map_err(|_| SessionError::HandoffClosed)?
    }

    /// Whether the exchange has been used
    pub async fn is_serviced(&self) -> bool {
        self.slot.lock().await.is_none()
    }
}

/// Session side of the handoff
pub struct OfferReceiver {
    rx: oneshot::Receiver<PendingOffer>,
}

impl OfferReceiver {
    /// Wait for the one offer this handoff will ever carry
    pub async fn recv(self) -> Result<IncomingOffer> {
        let pending = self.rx.await.map_err(|_| SessionError::HandoffClosed)?;
        Ok(IncomingOffer { pending })
    }
}

/// An offer waiting for its answer
pub struct IncomingOffer {
    pending: PendingOffer,
}

impl IncomingOffer {
    pub fn encoded_offer(&self) -> &str {
        &self.pending.encoded
    }

    /// Complete the exchange with an encoded answer
    pub fn respond(self, encoded_answer: String) -> Result<()> {
        self.pending
            .reply
            .send(Ok(encoded_answer))
            .map_err(|_| SessionError::HandoffClosed)
    }

    /// Fail only this request
    pub fn reject(self, error: SessionError) {
        if self.pending.reply.send(Err(error)).is_err() {
            debug!("Submitter left before the offer was rejected");
        }
    }
}
