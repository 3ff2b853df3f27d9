//! Session table
//!
//! One entry per live session, keyed by [`SessionId`]. Each entry owns the
//! cancellation token that tears its session down.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::{Result, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(SessionId)
            .map_err(|_| SessionError::session_not_found(s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for the engine to produce an answer
    Negotiating,
    /// Answer sent, waiting for capture to attach
    AwaitingCapture,
    /// Relay running
    Relaying,
    /// Tearing down
    Closing,
}

/// Snapshot of one session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub relay_addr: Option<SocketAddr>,
}

struct SessionEntry {
    info: SessionInfo,
    cancel: CancellationToken,
}

#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: SessionId, cancel: CancellationToken) {
        let entry = SessionEntry {
            info: SessionInfo {
                id,
                state: SessionState::Negotiating,
                created_at: Utc::now(),
                relay_addr: None,
            },
            cancel,
        };
        self.sessions.write().await.insert(id, entry);
        tracing::debug!("Registered session {}", id);
    }

    pub async fn set_state(&self, id: SessionId, state: SessionState) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id).ok_or_else(|| SessionError::session_not_found(id))?;
        entry.info.state = state;
        Ok(())
    }

    pub async fn set_relay_addr(&self, id: SessionId, addr: SocketAddr) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id).ok_or_else(|| SessionError::session_not_found(id))?;
        entry.info.relay_addr = Some(addr);
        Ok(())
    }

    /// Fire the session's cancellation token
    pub async fn cancel(&self, id: SessionId) -> Result<()> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(&id).ok_or_else(|| SessionError::session_not_found(id))?;
        entry.cancel.cancel();
        Ok(())
    }

    pub async fn remove(&self, id: SessionId) -> Option<SessionInfo> {
        let removed = self.sessions.write().await.remove(&id).map(|entry| entry.info);
        if removed.is_some() {
            tracing::debug!("Unregistered session {}", id);
        }
        removed
    }

    pub async fn get(&self, id: SessionId) -> Option<SessionInfo> {
        self.sessions.read().await.get(&id).map(|entry| entry.info.clone())
    }

    /// Snapshots ordered by creation time
    pub async fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> =
            self.sessions.read().await.values().map(|entry| entry.info.clone()).collect();
        sessions.sort_by_key(|info| info.created_at);
        sessions
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
