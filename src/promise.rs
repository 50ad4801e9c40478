//! Lifecycle-bound promise chains.
//!
//! A promise is created lazily on the promise pool and bound to its owner;
//! `then` continuations run on the main scheduler and `catch` handlers receive
//! failures there too.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use tracing::debug;

use crate::core::error::{BindError, TaskError};
use crate::core::task::{spawn_lazy_with, TaskHandle};
use crate::lifecycle::bridge::register_auto_unbind;
use crate::lifecycle::{CancelOn, Lifecycle, LifecycleOwner};
use crate::scheduler::Schedulers;

/// A task paired with the owner whose destruction cancels it.
pub struct Promise<T> {
    lifecycle: Arc<Lifecycle>,
    handle: TaskHandle<T>,
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("owner", &self.lifecycle.name())
            .field("handle", &self.handle)
            .finish()
    }
}

impl<T: Send + 'static> Promise<T> {
    fn bound(lifecycle: Arc<Lifecycle>, handle: TaskHandle<T>) -> Self {
        register_auto_unbind(&lifecycle, &handle, CancelOn::Destroy);
        Self { lifecycle, handle }
    }

    /// The underlying task.
    #[must_use]
    pub const fn handle(&self) -> &TaskHandle<T> {
        &self.handle
    }

    /// The owner's lifecycle.
    #[must_use]
    pub const fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Start the work without attaching a continuation.
    pub fn start(&self) -> bool {
        self.handle.start()
    }

    /// Deliver any failure of this promise to `handler` on the main
    /// scheduler.
    ///
    /// Does not start a lazy promise.
    #[must_use = "catch returns the promise for chaining"]
    pub fn catch(self, handler: impl FnOnce(TaskError) + Send + 'static) -> Self {
        let _ = self.handle.catch(handler);
        self
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Start the promise and run `continuation` with its value on the main
    /// scheduler.
    ///
    /// The returned promise fails with the antecedent's error if the
    /// antecedent fails or is cancelled; `continuation` is not called then.
    #[must_use = "the continuation promise carries its failures"]
    pub fn then<U, F>(self, continuation: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let antecedent = self.handle.clone();
        antecedent.mark_error_observed();
        let handle = spawn_lazy_with(Schedulers::global().main(), "then", async move {
            let value = antecedent.join().await?;
            Ok(continuation(value))
        });
        let next = Promise::bound(Arc::clone(&self.lifecycle), handle);
        next.handle.start();
        next
    }
}

/// Lazily run `work` on the promise pool, cancelled when `owner` is
/// destroyed.
///
/// Nothing runs until the promise is started, joined or chained with
/// [`Promise::then`].
///
/// The cancellation observer is registered right away and removed when the
/// task finishes. A promise that is never started never finishes, so its
/// observer, and the task it holds, stay registered on the owner until the
/// owner is destroyed. On long-lived owners, start every promise or cancel
/// its handle.
///
/// # Errors
///
/// Returns [`BindError::NoLifecycle`] if the owner has no lifecycle.
pub fn promise<O, T, E, F>(owner: &O, work: F) -> Result<Promise<T>, BindError>
where
    O: LifecycleOwner + ?Sized,
    T: Send + 'static,
    E: Into<anyhow::Error>,
    F: Future<Output = Result<T, E>> + Send + 'static,
{
    let lifecycle = owner.lifecycle().ok_or(BindError::NoLifecycle)?;
    let handle = spawn_lazy_with(
        Schedulers::global().promise(),
        "promise",
        work.map(|r| r.map_err(TaskError::failed)),
    );
    Ok(Promise::bound(lifecycle, handle))
}

/// Like [`promise`] for synchronous work.
///
/// # Errors
///
/// Returns [`BindError::NoLifecycle`] if the owner has no lifecycle.
pub fn promise_blocking<O, T, E, F>(owner: &O, work: F) -> Result<Promise<T>, BindError>
where
    O: LifecycleOwner + ?Sized,
    T: Send + 'static,
    E: Into<anyhow::Error>,
    F: FnOnce() -> Result<T, E> + Send + 'static,
{
    promise(owner, async move { work() })
}

/// Fire-and-forget work on the io pool. The result is logged; failures are
/// logged as uncaught.
pub fn background<T, E, F>(work: F) -> TaskHandle<()>
where
    T: fmt::Debug + Send + 'static,
    E: Into<anyhow::Error>,
    F: Future<Output = Result<T, E>> + Send + 'static,
{
    let handle = spawn_lazy_with(Schedulers::global().io(), "background", async move {
        let result = work.await.map_err(TaskError::failed)?;
        debug!(?result, "background task result");
        Ok(())
    });
    handle.start();
    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::CancelCause;
    use crate::lifecycle::LifecycleEvent;
    use crossbeam_channel::bounded;
    use std::time::Duration;

    #[test]
    fn test_then_runs_on_main_with_value() {
        let owner = Lifecycle::new("promise-then");
        let (tx, rx) = bounded(1);
        let _chain = promise(&owner, async { Ok::<_, anyhow::Error>(21) })
            .unwrap()
            .then(move |value| {
                let on_main = Schedulers::global().main_thread().is_current();
                tx.send((value * 2, on_main)).unwrap();
            });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), (42, true));
    }

    #[test]
    fn test_failure_reaches_catch_not_then() {
        let owner = Lifecycle::new("promise-catch");
        let (tx, rx) = bounded(2);
        let then_tx = tx.clone();
        let _chain = promise(&owner, async { Err::<u32, _>(anyhow::anyhow!("offline")) })
            .unwrap()
            .then(move |_| then_tx.send("then".to_owned()).unwrap())
            .catch(move |err| tx.send(err.to_string()).unwrap());
        let got = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(got.contains("offline"), "got {got}");
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_destroy_cancels_pending_promise() {
        let owner = Lifecycle::new("promise-destroy");
        let pending = promise(&owner, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, anyhow::Error>(())
        })
        .unwrap();
        pending.start();
        assert!(Schedulers::global().main_thread().flush());
        owner.handle_event(LifecycleEvent::Destroy);
        assert!(matches!(
            pending.handle().try_outcome(),
            Some(Err(TaskError::Cancelled(CancelCause::Lifecycle(LifecycleEvent::Destroy))))
        ));
    }

    #[test]
    fn test_blocking_promise() {
        let owner = Lifecycle::new("promise-blocking");
        let p = promise_blocking(&owner, || Ok::<_, anyhow::Error>("done")).unwrap();
        assert_eq!(futures::executor::block_on(p.handle().join()).unwrap(), "done");
    }
}
