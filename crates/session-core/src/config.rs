//! Session configuration

use std::path::PathBuf;
use std::time::Duration;

use rtpbridge_media_core::capture::DEFAULT_KEYFRAME_INTERVAL;
use rtpbridge_media_core::RelayConfig;

use crate::errors::{Result, SessionError};

/// Where and how inbound tracks are captured
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Directory receiving `{session_id}_{ssrc}.ivf` files
    pub output_dir: PathBuf,
    pub keyframe_interval: Duration,
    /// How long the relay waits for capture to start; `None` waits forever
    pub readiness_timeout: Option<Duration>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            keyframe_interval: DEFAULT_KEYFRAME_INTERVAL,
            readiness_timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub relay: RelayConfig,
    pub capture: CaptureConfig,
    /// Concurrent sessions; further offers wait for a free slot
    pub max_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            relay: RelayConfig::default(),
            capture: CaptureConfig::default(),
            max_sessions: 1,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        self.relay.validate()?;
        if self.max_sessions == 0 {
            return Err(SessionError::ConfigError("max_sessions must be at least 1".to_string()));
        }
        let last_port = self.relay.listen.port() as usize + self.max_sessions - 1;
        if self.relay.listen.port() != 0 && last_port > u16::MAX as usize {
            return Err(SessionError::ConfigError(format!(
                "relay ports {}..={} do not fit in the port range",
                self.relay.listen.port(),
                last_port
            )));
        }
        if self.capture.keyframe_interval.is_zero() {
            return Err(SessionError::ConfigError("keyframe interval must be positive".to_string()));
        }
        Ok(())
    }
}
