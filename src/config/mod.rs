//! Configuration models for schedulers and the process-wide runtime.

pub mod scheduler;

pub use scheduler::{RecyclablePoolConfig, RuntimeConfig, WorkStealingConfig};
