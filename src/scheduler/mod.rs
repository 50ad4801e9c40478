//! Dispatchers backed by dedicated OS threads.
//!
//! Three flavours are provided:
//!
//! - [`RecyclablePool`]: core-sized pool whose idle workers (core ones
//!   included) exit after a keep-alive period. Backs promise and flow work.
//! - [`WorkStealingPool`]: fixed parallelism, per-worker deques, steal on idle.
//!   Backs IO/CPU fan-out.
//! - [`MainThread`]: single consumer thread used for continuation and callback
//!   delivery.
//!
//! Every pool is created lazily on first submission, exactly once, through
//! [`LazySlot`].

mod lazy;
mod main_thread;
mod recyclable;
mod registry;
mod work_stealing;

use tracing::error;

use crate::core::error::Rejected;

pub use lazy::LazySlot;
pub use main_thread::MainThread;
pub use recyclable::RecyclablePool;
pub use registry::Schedulers;
pub use work_stealing::WorkStealingPool;

/// Unit of work accepted by a [`Dispatcher`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A worker-pool abstraction accepting dispatched jobs.
pub trait Dispatcher: Send + Sync + 'static {
    /// Human readable scheduler name, used in logs and rejections.
    fn name(&self) -> &str;

    /// Submit a job.
    ///
    /// # Errors
    ///
    /// Returns [`Rejected`] when the scheduler is closed or cannot start a
    /// worker. The job is dropped in that case.
    fn execute(&self, job: Job) -> Result<(), Rejected>;

    /// Submit a job, logging instead of returning a rejection.
    fn dispatch(&self, job: Job) {
        if let Err(rejected) = self.execute(job) {
            error!(scheduler = self.name(), error = %rejected, "error executing task");
        }
    }

    /// Shut the scheduler down. Queued jobs still run; new ones are rejected.
    fn close(&self);

    /// Whether [`Dispatcher::close`] has been called.
    fn is_closed(&self) -> bool;
}

/// Run a job, containing any panic so the calling worker survives.
pub(crate) fn run_job(scheduler: &str, job: Job) {
    if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
        error!(
            scheduler = scheduler,
            panic = %crate::core::task::panic_message(panic.as_ref()),
            "job panicked on worker thread"
        );
    }
}
