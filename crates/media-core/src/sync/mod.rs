//! Synchronization between the capture and relay sides of a session

mod barrier;

pub use barrier::{readiness_barrier, ReadySignal, ReadyWait};
