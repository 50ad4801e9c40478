//! Cancellable, awaitable task handles.
//!
//! A [`TaskHandle`] owns exactly one terminal outcome: a value, a failure or a
//! cancellation. The first terminal transition wins; later attempts are
//! ignored, so cancelling twice fires no second callback.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::{AbortHandle, Abortable};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, error};

use crate::core::error::{CancelCause, TaskError};
use crate::core::exec;
use crate::scheduler::{Dispatcher, Schedulers};
use crate::util::telemetry::task_debug_enabled;

/// Unique task identifier.
pub type TaskId = u64;

/// Identifier of a completion listener.
pub type ListenerId = u64;

/// Callback run once when a task reaches a terminal state. Receives the
/// failure, or `None` on success.
pub type FinishListener = Box<dyn FnOnce(Option<&TaskError>) + Send>;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// Created lazily; nothing has run yet.
    Created,
    /// Submitted to its dispatcher.
    Running,
    /// Produced a value.
    Resolved,
    /// User work failed or panicked.
    Failed,
    /// Cancelled before producing a value.
    Cancelled,
}

impl TaskState {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Failed | Self::Cancelled)
    }
}

/// Type-erased control surface of a task, used by owners and scopes that
/// cancel tasks without knowing their output type.
pub trait TaskControl: Send + Sync {
    /// Task identifier.
    fn id(&self) -> TaskId;

    /// Cancel with a cause. Returns `false` if the task was already terminal.
    fn cancel_with(&self, cause: CancelCause) -> bool;

    /// Whether a terminal state was reached.
    fn is_finished(&self) -> bool;

    /// Register a completion listener; runs immediately if already finished.
    fn on_finish(&self, listener: FinishListener) -> ListenerId;

    /// Remove a listener that has not fired yet.
    fn remove_finish_listener(&self, id: ListenerId) -> bool;
}

/// Anything that exposes a [`TaskControl`].
pub trait AsTaskControl {
    /// The shared control object.
    fn control(&self) -> Arc<dyn TaskControl>;
}

type Launch = Box<dyn FnOnce() + Send>;

struct Inner<T> {
    state: TaskState,
    outcome: Option<Result<T, TaskError>>,
    listeners: Vec<(ListenerId, FinishListener)>,
    launch: Option<Launch>,
    abort: Option<AbortHandle>,
    error_observed: bool,
    settled: bool,
}

pub(crate) struct TaskCell<T> {
    id: TaskId,
    label: &'static str,
    inner: Mutex<Inner<T>>,
    done: Notify,
}

impl<T: Send + 'static> TaskCell<T> {
    fn new(label: &'static str) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            label,
            inner: Mutex::new(Inner {
                state: TaskState::Created,
                outcome: None,
                listeners: Vec::new(),
                launch: None,
                abort: None,
                error_observed: false,
                settled: false,
            }),
            done: Notify::new(),
        })
    }

    fn start(&self) -> bool {
        let launch = {
            let mut inner = self.inner.lock();
            if inner.state != TaskState::Created {
                return false;
            }
            inner.state = TaskState::Running;
            inner.launch.take()
        };
        if task_debug_enabled() {
            debug!(task_id = self.id, label = self.label, "task started");
        }
        if let Some(launch) = launch {
            launch();
        }
        true
    }

    fn finish(&self, outcome: Result<T, TaskError>) -> bool {
        let (listeners, failure) = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return false;
            }
            inner.state = match &outcome {
                Ok(_) => TaskState::Resolved,
                Err(TaskError::Cancelled(_)) => TaskState::Cancelled,
                Err(_) => TaskState::Failed,
            };
            let failure = outcome.as_ref().err().cloned();
            inner.outcome = Some(outcome);
            inner.abort = None;
            (std::mem::take(&mut inner.listeners), failure)
        };
        match &failure {
            Some(err) => debug!(task_id = self.id, label = self.label, error = %err, "task finished with failure"),
            None if task_debug_enabled() => debug!(task_id = self.id, label = self.label, "task resolved"),
            None => {}
        }
        for (_, listener) in listeners {
            listener(failure.as_ref());
        }
        self.inner.lock().settled = true;
        self.done.notify_waiters();
        true
    }

    fn cancel(&self, cause: CancelCause) -> bool {
        let (abort, launch) = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return false;
            }
            (inner.abort.take(), inner.launch.take())
        };
        drop(launch);
        let finished = self.finish(Err(TaskError::Cancelled(cause)));
        if let Some(abort) = abort {
            abort.abort();
        }
        finished
    }

    fn state(&self) -> TaskState {
        self.inner.lock().state
    }

    fn add_listener(&self, listener: FinishListener) -> ListenerId {
        let id = NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed);
        let failure = {
            let mut inner = self.inner.lock();
            match inner.outcome.as_ref() {
                None => {
                    inner.listeners.push((id, listener));
                    return id;
                }
                Some(outcome) => outcome.as_ref().err().cloned(),
            }
        };
        listener(failure.as_ref());
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(listener_id, _)| *listener_id != id);
        inner.listeners.len() != before
    }

    fn mark_error_observed(&self) {
        self.inner.lock().error_observed = true;
    }
}

// A failure counts as uncaught only once no handle can attach a handler
// anymore, so the check runs when the last reference goes away.
impl<T> Drop for TaskCell<T> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.error_observed {
            return;
        }
        if let Some(Err(err)) = inner.outcome.as_ref() {
            if !err.is_cancelled() {
                error!(task_id = self.id, label = self.label, error = %err, "uncaught failure in task");
            }
        }
    }
}

impl<T: Send + 'static> TaskControl for TaskCell<T> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn cancel_with(&self, cause: CancelCause) -> bool {
        self.cancel(cause)
    }

    fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    fn on_finish(&self, listener: FinishListener) -> ListenerId {
        self.add_listener(listener)
    }

    fn remove_finish_listener(&self, id: ListenerId) -> bool {
        self.remove_listener(id)
    }
}

/// Handle to a unit of asynchronous work. Cloning shares the same task.
pub struct TaskHandle<T> {
    cell: Arc<TaskCell<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.cell.id)
            .field("label", &self.cell.label)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> TaskHandle<T> {
    /// Task identifier.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.cell.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.cell.state()
    }

    /// Submit a lazily created task. Returns `false` if it was already
    /// started or is terminal.
    pub fn start(&self) -> bool {
        self.cell.start()
    }

    /// Cancel the task. Idempotent: returns `false` when already terminal.
    pub fn cancel(&self) -> bool {
        self.cell.cancel(CancelCause::Requested)
    }

    /// Cancel the task with an explicit cause.
    pub fn cancel_with(&self, cause: CancelCause) -> bool {
        self.cell.cancel(cause)
    }

    /// Whether the task ended in cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    /// Whether the task reached a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Register a completion listener. It runs exactly once, on the thread
    /// that completes the task, or immediately if the task already finished.
    pub fn on_finish(&self, listener: impl FnOnce(Option<&TaskError>) + Send + 'static) -> ListenerId {
        self.cell.add_listener(Box::new(listener))
    }

    /// Remove a listener that has not fired yet.
    pub fn remove_finish_listener(&self, id: ListenerId) -> bool {
        self.cell.remove_listener(id)
    }

    /// Deliver any failure (cancellation included) to `handler` on the main
    /// scheduler. Marks the failure as handled, so it is not logged as
    /// uncaught.
    #[must_use = "catch returns the same handle for chaining"]
    pub fn catch(&self, handler: impl FnOnce(TaskError) + Send + 'static) -> Self {
        self.cell.mark_error_observed();
        let main = Arc::clone(Schedulers::global().main_thread());
        self.on_finish(move |failure| {
            if let Some(err) = failure {
                let err = err.clone();
                if let Err(rejected) = main.run_or_post(move || handler(err)) {
                    error!(error = %rejected, "failed to deliver task failure");
                }
            }
        });
        self.clone()
    }

    /// Mark failures as consumed by another task (for example a continuation
    /// that re-raises them), so they are not logged twice.
    pub(crate) fn mark_error_observed(&self) {
        self.cell.mark_error_observed();
    }
}

impl<T: Clone + Send + 'static> TaskHandle<T> {
    /// Start the task if needed and wait for its outcome. Returns after every
    /// completion listener has run. The caller receives any failure, so it is
    /// not logged as uncaught.
    ///
    /// # Errors
    ///
    /// Returns the task's failure or cancellation.
    pub async fn join(&self) -> Result<T, TaskError> {
        self.cell.mark_error_observed();
        self.start();
        loop {
            let mut notified = pin!(self.cell.done.notified());
            notified.as_mut().enable();
            {
                let inner = self.cell.inner.lock();
                if inner.settled {
                    if let Some(outcome) = inner.outcome.clone() {
                        return outcome;
                    }
                }
            }
            notified.await;
        }
    }

    /// The outcome, if the task has finished.
    #[must_use]
    pub fn try_outcome(&self) -> Option<Result<T, TaskError>> {
        self.cell.inner.lock().outcome.clone()
    }
}

impl<T: Send + 'static> AsTaskControl for TaskHandle<T> {
    fn control(&self) -> Arc<dyn TaskControl> {
        Arc::clone(&self.cell) as Arc<dyn TaskControl>
    }
}

/// Render a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

/// Create a task that runs `future` on `dispatcher` once started.
///
/// Nothing is submitted until [`TaskHandle::start`] or [`TaskHandle::join`].
/// Panics inside the future fail the task with [`TaskError::Panicked`].
/// A rejection by the dispatcher cancels the task with
/// [`CancelCause::Rejected`].
pub fn spawn_lazy_with<T, F>(dispatcher: Arc<dyn Dispatcher>, label: &'static str, future: F) -> TaskHandle<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T, TaskError>> + Send + 'static,
{
    let cell = TaskCell::new(label);
    let (abort, registration) = AbortHandle::new_pair();
    let weak: Weak<TaskCell<T>> = Arc::downgrade(&cell);

    let launch: Launch = Box::new(move || {
        let Some(cell) = weak.upgrade() else {
            return;
        };
        let finisher = Arc::clone(&cell);
        let body = async move {
            let guarded = Abortable::new(AssertUnwindSafe(future).catch_unwind(), registration);
            match guarded.await {
                Ok(Ok(outcome)) => {
                    finisher.finish(outcome);
                }
                Ok(Err(panic)) => {
                    finisher.finish(Err(TaskError::Panicked(panic_message(panic.as_ref()))));
                }
                Err(_aborted) => {}
            }
        };
        let rejecter = Arc::clone(&cell);
        let spawned = exec::spawn_raw(dispatcher, Box::pin(body), move |rejected| {
            rejecter.cancel(CancelCause::Rejected(rejected));
        });
        if let Err(rejected) = spawned {
            cell.cancel(CancelCause::Rejected(rejected));
        }
    });

    {
        let mut inner = cell.inner.lock();
        inner.launch = Some(launch);
        inner.abort = Some(abort);
    }
    TaskHandle { cell }
}

/// Lazily run fallible user work on `dispatcher`.
pub fn spawn_lazy<T, E, F>(dispatcher: Arc<dyn Dispatcher>, future: F) -> TaskHandle<T>
where
    T: Send + 'static,
    E: Into<anyhow::Error>,
    F: Future<Output = Result<T, E>> + Send + 'static,
{
    spawn_lazy_with(dispatcher, "task", future.map(|r| r.map_err(TaskError::failed)))
}

/// Run fallible user work on `dispatcher` immediately.
pub fn spawn<T, E, F>(dispatcher: Arc<dyn Dispatcher>, future: F) -> TaskHandle<T>
where
    T: Send + 'static,
    E: Into<anyhow::Error>,
    F: Future<Output = Result<T, E>> + Send + 'static,
{
    let handle = spawn_lazy(dispatcher, future);
    handle.start();
    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecyclablePoolConfig;
    use crate::core::error::RejectReason;
    use crate::scheduler::RecyclablePool;
    use futures::executor::block_on;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn pool(name: &str) -> Arc<dyn Dispatcher> {
        Arc::new(RecyclablePool::new(RecyclablePoolConfig::new(name).with_core_threads(2)))
    }

    #[test]
    fn test_lazy_until_joined() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let handle = spawn_lazy(pool("lazy"), async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(5)
        });
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(handle.state(), TaskState::Created);
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        assert_eq!(block_on(handle.join()).unwrap(), 5);
        assert_eq!(handle.state(), TaskState::Resolved);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_and_panic_are_captured() {
        let failing = spawn(pool("fail"), async { Err::<u8, _>(anyhow::anyhow!("bad input")) });
        let err = block_on(failing.join()).unwrap_err();
        assert!(matches!(err, TaskError::Failed(_)));
        assert_eq!(failing.state(), TaskState::Failed);

        let panicking = spawn(pool("panic"), async {
            if true {
                panic!("kaboom");
            }
            Ok::<u8, anyhow::Error>(0)
        });
        match block_on(panicking.join()) {
            Err(TaskError::Panicked(msg)) => assert_eq!(msg, "kaboom"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let handle = spawn(pool("cancel"), async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, anyhow::Error>(())
        });
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        handle.on_finish(move |err| {
            assert!(err.is_some_and(TaskError::is_cancelled));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(!handle.cancel_with(CancelCause::Scope));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(handle.is_cancelled());
        assert!(matches!(
            block_on(handle.join()),
            Err(TaskError::Cancelled(CancelCause::Requested))
        ));
    }

    #[test]
    fn test_rejected_submission_cancels() {
        let closed = pool("closed");
        closed.close();
        let handle = spawn(closed, async { Ok::<_, anyhow::Error>(1) });
        match block_on(handle.join()) {
            Err(TaskError::Cancelled(CancelCause::Rejected(rejected))) => {
                assert_eq!(rejected.reason, RejectReason::Shutdown);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_listener_after_completion_runs_immediately() {
        let handle = spawn(pool("late"), async { Ok::<_, anyhow::Error>(3) });
        assert_eq!(block_on(handle.join()).unwrap(), 3);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        handle.on_finish(move |err| {
            assert!(err.is_none());
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_removed_listener_does_not_fire() {
        let handle = spawn_lazy(pool("remove"), async { Ok::<_, anyhow::Error>(()) });
        let id = handle.on_finish(|_| panic!("listener should have been removed"));
        assert!(handle.remove_finish_listener(id));
        block_on(handle.join()).unwrap();
    }
}
