//! Builders to construct schedulers from configuration.

use tracing::debug;

use crate::config::RuntimeConfig;
use crate::core::SchedulerError;
use crate::scheduler::{MainThread, RecyclablePool, Schedulers, WorkStealingPool};
use crate::util::telemetry;

/// Build a scheduler registry from runtime configuration.
///
/// Pools are described, not started: each creates its threads on first
/// submission.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidConfig`] when validation fails.
pub fn build_schedulers(cfg: &RuntimeConfig) -> Result<Schedulers, SchedulerError> {
    cfg.validate().map_err(SchedulerError::InvalidConfig)?;

    if cfg.debug {
        telemetry::enable_task_debug();
    }
    debug!(
        promise = %cfg.promise.name,
        flow = %cfg.flow.name,
        io = %cfg.io.name,
        io_parallelism = cfg.io.resolved_parallelism(),
        "building schedulers"
    );

    Ok(Schedulers::from_parts(
        cfg.clone(),
        RecyclablePool::new(cfg.promise.clone()),
        RecyclablePool::new(cfg.flow.clone()),
        WorkStealingPool::new(cfg.io.clone()),
        MainThread::new(cfg.main_thread_name.clone()),
    ))
}
