//! The per-session flow
//!
//! offer → decode → negotiate → answer → capture attach → readiness →
//! relay bind → relay until end of stream, failure or cancellation.

mod dispatch;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rtpbridge_media_core::{readiness_barrier, RelayLoop, RelayStats, ReadyWait};
use rtpbridge_rtp_core::Vp8Depacketizer;

use crate::config::SessionConfig;
use crate::coordinator::{SessionId, SessionRegistry, SessionState};
use crate::engine::{MediaEngine, NegotiatedSession, PeerSession};
use crate::errors::{Result, SessionError};
use crate::events::SessionEvent;
use crate::signaling::{decode_description, encode_description, OfferReceiver, SdpType};

use dispatch::TrackDispatcher;

/// How long teardown waits for capture and keyframe tasks
const DISPATCH_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) struct SessionContext {
    pub id: SessionId,
    /// `relay.listen` is already this session's slot address
    pub config: SessionConfig,
    pub engine: Arc<dyn MediaEngine>,
    pub registry: SessionRegistry,
    pub events: broadcast::Sender<SessionEvent>,
}

impl SessionContext {
    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn set_state(&self, state: SessionState) {
        if let Err(e) = self.registry.set_state(self.id, state).await {
            debug!("Could not update session state: {}", e);
        }
    }
}

/// Run one session to completion.
///
/// Returns `Ok(None)` when cancelled before an offer arrived.
pub(crate) async fn run_session(
    ctx: SessionContext,
    receiver: OfferReceiver,
    cancel: CancellationToken,
) -> Result<Option<RelayStats>> {
    let offer = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(None),
        offer = receiver.recv() => offer?,
    };

    let description = match decode_description(offer.encoded_offer()) {
        Ok(description) if description.sdp_type == SdpType::Offer => description,
        Ok(description) => {
            let err = SessionError::malformed_offer(format!(
                "expected an offer, got {}",
                description.sdp_type
            ));
            offer.reject(err.clone());
            return Err(err);
        }
        Err(e) => {
            offer.reject(e.clone());
            return Err(e);
        }
    };

    let negotiated = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            offer.reject(SessionError::ShuttingDown);
            return Ok(None);
        }
        negotiated = ctx.engine.negotiate(description) => negotiated,
    };
    let negotiated = match negotiated {
        Ok(negotiated) => negotiated,
        Err(e) => {
            offer.reject(e.clone());
            return Err(e);
        }
    };

    let answered = encode_description(&negotiated.answer).and_then(|answer| offer.respond(answer));
    if let Err(e) = answered {
        warn!("Could not deliver the answer: {}", e);
        close_peer(&negotiated.peer).await;
        return Err(e);
    }
    info!("Answer delivered");
    ctx.emit(SessionEvent::Negotiated {
        session_id: ctx.id,
        at: Utc::now(),
    });
    ctx.set_state(SessionState::AwaitingCapture).await;

    run_media(ctx, negotiated, cancel).await
}

async fn run_media(
    ctx: SessionContext,
    negotiated: NegotiatedSession,
    cancel: CancellationToken,
) -> Result<Option<RelayStats>> {
    let NegotiatedSession {
        outbound,
        inbound,
        peer,
        ..
    } = negotiated;

    let (ready_signal, ready_wait) = readiness_barrier();
    let dispatcher = TrackDispatcher {
        session_id: ctx.id,
        capture: ctx.config.capture.clone(),
        events: ctx.events.clone(),
    };
    let mut dispatch_task = tokio::spawn(dispatcher.run(inbound, ready_signal, cancel.clone()));

    let result: Result<Option<RelayStats>> = async {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            ready = wait_ready(ready_wait, ctx.config.capture.readiness_timeout) => ready?,
        }
        debug!("Capture attached, starting relay");

        let relay = RelayLoop::bind(ctx.config.relay.clone(), Vp8Depacketizer::new(), outbound).await?;
        let addr = relay.local_addr()?;
        if let Err(e) = ctx.registry.set_relay_addr(ctx.id, addr).await {
            debug!("Could not record relay address: {}", e);
        }
        ctx.set_state(SessionState::Relaying).await;
        ctx.emit(SessionEvent::RelayListening {
            session_id: ctx.id,
            addr,
            at: Utc::now(),
        });

        let stats = relay.run(cancel.clone()).await?;
        info!(
            "Relay finished: {} packets, {} samples written",
            stats.packets_received, stats.samples_written
        );
        Ok(Some(stats))
    }
    .await;

    ctx.set_state(SessionState::Closing).await;
    cancel.cancel();
    if tokio::time::timeout(DISPATCH_SHUTDOWN_TIMEOUT, &mut dispatch_task).await.is_err() {
        warn!("Track tasks did not stop in time, aborting");
        dispatch_task.abort();
    }
    close_peer(&peer).await;

    result
}

async fn wait_ready(wait: ReadyWait, timeout: Option<Duration>) -> Result<()> {
    match timeout {
        Some(timeout) => match wait.wait_timeout(timeout).await {
            Some(ready) => Ok(ready?),
            None => Err(SessionError::timeout(format!(
                "capture did not start within {:?}",
                timeout
            ))),
        },
        None => Ok(wait.wait().await?),
    }
}

async fn close_peer(peer: &Arc<dyn PeerSession>) {
    if let Err(e) = peer.close().await {
        warn!("Failed to close peer session: {}", e);
    }
}
