//! Telemetry helpers for structured logging and tracing.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::EnvFilter;

static TASK_DEBUG: AtomicBool = AtomicBool::new(false);

/// Initialize tracing. Users can install their own subscriber; this helper
/// installs a default env-based subscriber if none is set.
///
/// `RUST_LOG` wins when present. Otherwise the crate logs at `debug` when task
/// debugging is enabled and everything else at `info`.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if task_debug_enabled() {
            EnvFilter::new("info,lifecycle_scheduler=debug")
        } else {
            EnvFilter::new("info")
        }
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}

/// Log every task state transition.
pub fn enable_task_debug() {
    TASK_DEBUG.store(true, Ordering::Relaxed);
}

/// Whether task transitions are logged.
pub fn task_debug_enabled() -> bool {
    TASK_DEBUG.load(Ordering::Relaxed)
}
