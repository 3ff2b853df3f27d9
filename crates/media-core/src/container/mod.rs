//! On-disk containers for captured media

pub mod ivf;

pub use ivf::IvfWriter;
