//! Bridge configuration
//!
//! Defaults, then an optional TOML file, then `RTPBRIDGE__SECTION__KEY`
//! environment variables, then command line flags.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use rtpbridge_infra_common::config::LayeredConfig;
use rtpbridge_infra_common::logging::parse_log_level;
use rtpbridge_infra_common::LoggingConfig;
use rtpbridge_media_core::{ReadErrorPolicy, RelayConfig};
use rtpbridge_session_core::{CaptureConfig, SessionConfig};
use rtpbridge_webrtc::WebRtcConfig;

pub const ENV_PREFIX: &str = "RTPBRIDGE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub http_bind: SocketAddr,
    pub demo_page: PathBuf,
    /// `Access-Control-Allow-Origin` on signaling responses
    pub allow_origin: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            http_bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            demo_page: PathBuf::from("demo.html"),
            allow_origin: "*".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySection {
    /// First session's RTP port; session N listens on port + N
    pub listen: SocketAddr,
    pub mtu: usize,
    pub decimation: u32,
    pub window_capacity: usize,
    pub on_read_error: ReadErrorPolicy,
}

impl Default for RelaySection {
    fn default() -> Self {
        let relay = RelayConfig::default();
        Self {
            listen: relay.listen,
            mtu: relay.mtu,
            decimation: relay.decimation,
            window_capacity: relay.window_capacity,
            on_read_error: relay.on_read_error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSection {
    pub output_dir: PathBuf,
    pub keyframe_interval_ms: u64,
    /// Unset waits for capture indefinitely
    pub readiness_timeout_ms: Option<u64>,
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            keyframe_interval_ms: 3000,
            readiness_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsSection {
    pub max_sessions: usize,
}

impl Default for SessionsSection {
    fn default() -> Self {
        Self { max_sessions: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub json: bool,
    pub file_info: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: ServerSection,
    pub relay: RelaySection,
    pub capture: CaptureSection,
    pub engine: WebRtcConfig,
    pub sessions: SessionsSection,
    pub logging: LoggingSection,
}

/// Command line values that override every other layer
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub http_bind: Option<String>,
    pub relay_listen: Option<String>,
    pub decimation: Option<u32>,
    pub output_dir: Option<String>,
    pub max_sessions: Option<usize>,
    pub log_level: Option<String>,
    pub json_logs: bool,
}

impl BridgeConfig {
    pub fn load(file: Option<PathBuf>, overrides: Overrides) -> anyhow::Result<Self> {
        let mut layered = LayeredConfig::with_defaults(&BridgeConfig::default())?;
        if let Some(path) = file {
            layered = layered.file(path);
        }
        layered = layered
            .env(ENV_PREFIX, &["engine.ice_servers"])
            .set_override_option("server.http_bind", overrides.http_bind)?
            .set_override_option("relay.listen", overrides.relay_listen)?
            .set_override_option("relay.decimation", overrides.decimation.map(i64::from))?
            .set_override_option("capture.output_dir", overrides.output_dir)?
            .set_override_option("sessions.max_sessions", overrides.max_sessions.map(|n| n as i64))?
            .set_override_option("logging.level", overrides.log_level)?;
        if overrides.json_logs {
            layered = layered.set_override("logging.json", true)?;
        }

        let config: BridgeConfig = layered.load().context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.session_config().validate()?;
        parse_log_level(&self.logging.level)?;
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            relay: RelayConfig {
                listen: self.relay.listen,
                mtu: self.relay.mtu,
                decimation: self.relay.decimation,
                window_capacity: self.relay.window_capacity,
                on_read_error: self.relay.on_read_error,
                ..RelayConfig::default()
            },
            capture: CaptureConfig {
                output_dir: self.capture.output_dir.clone(),
                keyframe_interval: Duration::from_millis(self.capture.keyframe_interval_ms),
                readiness_timeout: self.capture.readiness_timeout_ms.map(Duration::from_millis),
            },
            max_sessions: self.sessions.max_sessions,
        }
    }

    pub fn logging_config(&self) -> anyhow::Result<LoggingConfig> {
        let mut logging = LoggingConfig::new(parse_log_level(&self.logging.level)?, "rtpbridge");
        if self.logging.json {
            logging = logging.with_json();
        }
        if self.logging.file_info {
            logging = logging.with_file_info();
        }
        Ok(logging)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::load(None, Overrides::default()).unwrap();
        assert_eq!(config.server.http_bind.port(), 8080);
        assert_eq!(config.relay.listen.port(), 1234);
        assert_eq!(config.relay.mtu, 8192);
        assert_eq!(config.relay.decimation, 3);
        assert_eq!(config.relay.window_capacity, 50);
        assert_eq!(config.capture.keyframe_interval_ms, 3000);
        assert_eq!(config.capture.readiness_timeout_ms, None);
        assert_eq!(config.sessions.max_sessions, 1);
        assert_eq!(config.engine.vp8_payload_type, 96);
    }

    #[test]
    fn test_overrides_win() {
        let overrides = Overrides {
            decimation: Some(5),
            relay_listen: Some("127.0.0.1:5004".to_string()),
            json_logs: true,
            ..Default::default()
        };
        let config = BridgeConfig::load(None, overrides).unwrap();
        assert_eq!(config.relay.decimation, 5);
        assert_eq!(config.relay.listen, "127.0.0.1:5004".parse().unwrap());
        assert!(config.logging.json);
    }

    #[test]
    fn test_file_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rtpbridge.toml");
        std::fs::write(
            &path,
            "[relay]\nwindow_capacity = 128\non_read_error = \"skip\"\n\n[capture]\nreadiness_timeout_ms = 2500\n",
        )
        .unwrap();

        let config = BridgeConfig::load(Some(path), Overrides::default()).unwrap();
        assert_eq!(config.relay.window_capacity, 128);
        assert_eq!(config.relay.on_read_error, ReadErrorPolicy::Skip);
        assert_eq!(
            config.session_config().capture.readiness_timeout,
            Some(Duration::from_millis(2500))
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let overrides = Overrides {
            decimation: Some(0),
            ..Default::default()
        };
        assert!(BridgeConfig::load(None, overrides).is_err());

        let overrides = Overrides {
            log_level: Some("chatty".to_string()),
            ..Default::default()
        };
        assert!(BridgeConfig::load(None, overrides).is_err());
    }
}
