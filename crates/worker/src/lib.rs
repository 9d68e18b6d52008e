//! gpuq-worker
//!
//! The dispatcher daemon: configuration, the sequential consumer loop
//! (queue poll + blocking allocation + task launch + acknowledge), and
//! process shutdown handling.

pub mod config;
pub mod consumer;
pub mod shutdown;

pub use config::{ConfigError, WorkerConfig};
pub use consumer::{Consumer, PollOutcome};
