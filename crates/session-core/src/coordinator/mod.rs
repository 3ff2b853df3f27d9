//! Session coordination
//!
//! The [`SessionCoordinator`] is the supervisor of all sessions. Each offer
//! gets its own handoff, relay port slot, registry entry and cancellation
//! scope. A failure ends only the session it happened in.

pub mod registry;

pub use registry::{SessionId, SessionInfo, SessionRegistry, SessionState};

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tracing::{debug, error, info, info_span, Instrument};

use rtpbridge_infra_common::TaskManager;

use crate::config::SessionConfig;
use crate::engine::MediaEngine;
use crate::errors::{Result, SessionError};
use crate::events::SessionEvent;
use crate::session::{run_session, SessionContext};
use crate::signaling::SignalingHandoff;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const SESSION_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of a serviced offer
#[derive(Debug, Clone, Serialize)]
pub struct OfferAccepted {
    pub session_id: SessionId,
    /// Base64-of-JSON answer
    pub answer: String,
    /// Port the media source should send RTP to; 0 when the OS picks it
    pub relay_port: u16,
}

pub struct SessionCoordinator {
    config: SessionConfig,
    engine: Arc<dyn MediaEngine>,
    registry: SessionRegistry,
    events: broadcast::Sender<SessionEvent>,
    permits: Arc<Semaphore>,
    free_slots: Arc<Mutex<BTreeSet<usize>>>,
    tasks: TaskManager,
}

impl SessionCoordinator {
    pub fn new(config: SessionConfig, engine: Arc<dyn MediaEngine>) -> Result<Arc<Self>> {
        config.validate()?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let permits = Arc::new(Semaphore::new(config.max_sessions));
        let free_slots = Arc::new(Mutex::new((0..config.max_sessions).collect()));

        info!(
            "Session coordinator ready: max_sessions={} relay={}",
            config.max_sessions, config.relay.listen
        );

        Ok(Arc::new(Self {
            config,
            engine,
            registry: SessionRegistry::new(),
            events,
            permits,
            free_slots,
            tasks: TaskManager::with_timeout("sessions", SESSION_SHUTDOWN_TIMEOUT),
        }))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start a session for `encoded_offer` and wait for its answer.
    ///
    /// When every slot is busy this waits for one to free up; there is no
    /// timeout. Decode and negotiation failures fail only this call.
    pub async fn submit_offer(&self, encoded_offer: impl Into<String>) -> Result<OfferAccepted> {
        if self.tasks.is_shutting_down() {
            return Err(SessionError::ShuttingDown);
        }

        let permit = tokio::select! {
            biased;
            _ = self.tasks.cancel_token().cancelled() => return Err(SessionError::ShuttingDown),
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_| SessionError::ShuttingDown)?
            }
        };

        let slot = self
            .free_slots
            .lock()
            .await
            .pop_first()
            .ok_or_else(|| SessionError::media("no free relay slot"))?;

        let session_id = SessionId::new();
        let mut config = self.config.clone();
        let base_port = config.relay.listen.port();
        if base_port != 0 {
            config.relay.listen.set_port(base_port + slot as u16);
        }
        let relay_port = config.relay.listen.port();

        let cancel = self.tasks.cancel_token().child_token();
        self.registry.register(session_id, cancel.clone()).await;

        let (submitter, receiver) = SignalingHandoff::new();
        let ctx = SessionContext {
            id: session_id,
            config,
            engine: Arc::clone(&self.engine),
            registry: self.registry.clone(),
            events: self.events.clone(),
        };
        let registry = self.registry.clone();
        let events = self.events.clone();
        let free_slots = Arc::clone(&self.free_slots);
        let span = info_span!("session", id = %session_id, slot);

        let spawned = self
            .tasks
            .spawn_tracked(format!("session-{}", session_id), move |_scope| {
                async move {
                    let outcome = run_session(ctx, receiver, cancel).await;
                    let event = match outcome {
                        Ok(stats) => {
                            info!("Session terminated");
                            SessionEvent::Terminated {
                                session_id,
                                stats,
                                at: Utc::now(),
                            }
                        }
                        Err(e) => {
                            error!("Session failed: {}", e);
                            SessionEvent::Failed {
                                session_id,
                                error: e.to_string(),
                                at: Utc::now(),
                            }
                        }
                    };

                    registry.remove(session_id).await;
                    free_slots.lock().await.insert(slot);
                    drop(permit);
                    let _ = events.send(event);
                }
                .instrument(span)
            })
            .await;

        if let Err(e) = spawned {
            self.registry.remove(session_id).await;
            self.free_slots.lock().await.insert(slot);
            return Err(e.into());
        }

        debug!("Session {} waiting for its offer", session_id);
        let answer = submitter.submit(encoded_offer).await?;

        Ok(OfferAccepted {
            session_id,
            answer,
            relay_port,
        })
    }

    /// Cancel one session; its teardown runs in the background
    pub async fn terminate(&self, session_id: SessionId) -> Result<()> {
        info!("Terminating session {}", session_id);
        self.registry.cancel(session_id).await
    }

    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        self.registry.list().await
    }

    pub async fn session(&self, session_id: SessionId) -> Option<SessionInfo> {
        self.registry.get(session_id).await
    }

    pub fn active_sessions(&self) -> usize {
        self.tasks.active_task_count()
    }

    /// Cancel every session and wait for them to wind down
    pub async fn shutdown(&self) {
        info!("Shutting down {} sessions", self.active_sessions());
        self.permits.close();
        self.tasks.shutdown_all().await;
    }
}
