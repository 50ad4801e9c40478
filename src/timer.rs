//! One-shot and repeating timers.
//!
//! Every timer gets its own [`TimerHandle`], so cancelling one never touches
//! another. All timers are also children of a process-wide scope created on
//! first use; [`cancel_all`] cancels that scope and starts a fresh one.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::core::error::TaskError;
use crate::core::scope::TaskScope;
use crate::core::task::TaskHandle;
use crate::scheduler::{Dispatcher, LazySlot, Schedulers};

/// Handle to a single timer.
pub type TimerHandle = TaskHandle<()>;

static TIMERS: LazySlot<Mutex<TaskScope>> = LazySlot::new();

fn timers() -> Arc<Mutex<TaskScope>> {
    TIMERS.get_or_init(|| Mutex::new(TaskScope::new("timers")))
}

/// The shared scope new timers are launched into.
pub fn timer_scope() -> TaskScope {
    timers().lock().clone()
}

/// Cancel every live timer. Timers created afterwards are unaffected.
pub fn cancel_all() {
    let previous = {
        let slot = timers();
        let mut current = slot.lock();
        std::mem::replace(&mut *current, TaskScope::new("timers"))
    };
    info!(active = previous.active_tasks(), "cancelling all timers");
    previous.cancel();
}

async fn repeat(interval: Duration, mut block: impl FnMut() + Send) -> Result<(), TaskError> {
    loop {
        tokio::time::sleep(interval).await;
        block();
    }
}

/// Run `block` once on `dispatcher` after `delay`.
pub fn after(dispatcher: Arc<dyn Dispatcher>, delay: Duration, block: impl FnOnce() + Send + 'static) -> TimerHandle {
    debug!(scheduler = dispatcher.name(), ?delay, "timer scheduled");
    timer_scope().launch_with(dispatcher, "after", async move {
        tokio::time::sleep(delay).await;
        block();
        Ok(())
    })
}

/// Run `block` on `dispatcher` every `interval` until cancelled.
///
/// Sleep-then-run: the period drifts by the time `block` takes.
pub fn every(dispatcher: Arc<dyn Dispatcher>, interval: Duration, block: impl FnMut() + Send + 'static) -> TimerHandle {
    debug!(scheduler = dispatcher.name(), ?interval, "interval scheduled");
    timer_scope().launch_with(dispatcher, "every", repeat(interval, block))
}

/// [`after`] on the main scheduler.
pub fn set_timeout(delay: Duration, block: impl FnOnce() + Send + 'static) -> TimerHandle {
    after(Schedulers::global().main(), delay, block)
}

/// [`every`] on the io pool.
pub fn set_interval(interval: Duration, block: impl FnMut() + Send + 'static) -> TimerHandle {
    every(Schedulers::global().io(), interval, block)
}
