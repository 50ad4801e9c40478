//! Waker-driven future runner on top of any [`Dispatcher`].
//!
//! A spawned future is wrapped in a [`RawTask`]. Waking the task submits one
//! poll job to the dispatcher; the `scheduled` flag coalesces wakeups so at
//! most one poll job is queued at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::task::{waker_ref, ArcWake};
use parking_lot::Mutex;
use tracing::{error, trace};

use crate::core::error::Rejected;
use crate::runtime::driver;
use crate::scheduler::Dispatcher;

type RejectHook = Box<dyn Fn(Rejected) + Send + Sync>;

struct RawTask {
    future: Mutex<Option<BoxFuture<'static, ()>>>,
    dispatcher: Arc<dyn Dispatcher>,
    scheduled: AtomicBool,
    on_reject: RejectHook,
}

impl RawTask {
    fn schedule(self: &Arc<Self>) -> Result<(), Rejected> {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let task = Arc::clone(self);
        // On rejection `scheduled` stays set: the task is dead and later
        // wakeups are ignored.
        self.dispatcher.execute(Box::new(move || task.run()))
    }

    fn run(self: Arc<Self>) {
        self.scheduled.store(false, Ordering::Release);
        let _timer_context = driver::handle().map(tokio::runtime::Handle::enter);
        let waker = waker_ref(&self);
        let mut cx = Context::from_waker(&waker);
        let mut slot = self.future.lock();
        if let Some(future) = slot.as_mut() {
            if let Poll::Ready(()) = future.as_mut().poll(&mut cx) {
                *slot = None;
                trace!(scheduler = self.dispatcher.name(), "raw task finished");
            }
        }
    }
}

impl ArcWake for RawTask {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        if let Err(rejected) = arc_self.schedule() {
            error!(error = %rejected, "error execute coroutine task");
            (arc_self.on_reject)(rejected);
        }
    }
}

/// Spawn `future` on `dispatcher`.
///
/// The first poll is submitted immediately; its rejection is returned.
/// Rejections of later polls are reported through `on_reject`.
pub(crate) fn spawn_raw(
    dispatcher: Arc<dyn Dispatcher>,
    future: BoxFuture<'static, ()>,
    on_reject: impl Fn(Rejected) + Send + Sync + 'static,
) -> Result<(), Rejected> {
    let task = Arc::new(RawTask {
        future: Mutex::new(Some(future)),
        dispatcher,
        scheduled: AtomicBool::new(false),
        on_reject: Box::new(on_reject),
    });
    task.schedule()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecyclablePoolConfig;
    use crate::scheduler::RecyclablePool;
    use crossbeam_channel::bounded;
    use std::time::Duration;

    #[test]
    fn test_future_with_timer_runs_on_pool() {
        let pool: Arc<dyn Dispatcher> =
            Arc::new(RecyclablePool::new(RecyclablePoolConfig::new("raw").with_core_threads(2)));
        let (tx, rx) = bounded(1);
        spawn_raw(
            pool,
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let name = std::thread::current().name().map(str::to_owned);
                tx.send(name).unwrap();
            }),
            |_| {},
        )
        .unwrap();
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert!(name.starts_with("raw#"), "ran on {name}");
    }

    #[test]
    fn test_spawn_on_closed_dispatcher_is_rejected() {
        let pool = Arc::new(RecyclablePool::new(RecyclablePoolConfig::new("closed")));
        pool.close();
        let result = spawn_raw(pool, Box::pin(async {}), |_| {});
        assert!(result.is_err());
    }
}
