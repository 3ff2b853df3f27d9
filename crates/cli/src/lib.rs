//! rtpbridge process bootstrap: configuration and the HTTP surface

pub mod config;
pub mod http;

pub use config::{BridgeConfig, Overrides};
pub use http::{router, AppState};
