//! Common infrastructure for rtpbridge
//!
//! - `logging`: tracing-subscriber setup
//! - `config`: layered configuration (defaults, TOML file, environment, overrides)
//! - `tasks`: tracked task spawning with cooperative cancellation
//! - `errors`: shared error type

pub mod config;
pub mod errors;
pub mod logging;
pub mod tasks;

pub use errors::{Error, Result};
pub use logging::{setup_logging, LoggingConfig};
pub use tasks::TaskManager;
