//! Process-wide tokio runtime that drives timers.
//!
//! Tasks are polled on pool threads that are not tokio workers. Each poll
//! enters this runtime's handle so `tokio::time` sleeps and intervals register
//! with a live time driver.

use std::sync::OnceLock;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::error;

static DRIVER: OnceLock<Option<Runtime>> = OnceLock::new();

/// Handle of the timer runtime, started on first use.
///
/// Returns `None` if the runtime could not be built; timers then fail inside
/// the task that uses them.
pub fn handle() -> Option<&'static Handle> {
    DRIVER
        .get_or_init(|| {
            Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("lifecycle-timer")
                .enable_time()
                .build()
                .map_err(|err| error!(error = %err, "failed to start timer runtime"))
                .ok()
        })
        .as_ref()
        .map(Runtime::handle)
}
