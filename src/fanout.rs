//! Fan-out of independent tasks bound to one owner, with positional result
//! and error aggregation.
//!
//! Indices always refer to the position of the work in the input sequence,
//! never to completion order.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error};

use crate::core::error::{BindError, TaskError};
use crate::core::task::{spawn_lazy_with, TaskHandle};
use crate::lifecycle::bridge::register_auto_unbind;
use crate::lifecycle::{CancelOn, Lifecycle, LifecycleOwner};
use crate::scheduler::Schedulers;

/// Outcome of one fan-out task, by input position.
#[derive(Debug, Clone, Serialize)]
pub struct IndexedFailure {
    /// Position of the task in the input sequence.
    pub index: usize,
    /// The failure, or `None` if the task resolved.
    #[serde(serialize_with = "serialize_cause")]
    pub cause: Option<TaskError>,
}

fn serialize_cause<S: serde::Serializer>(cause: &Option<TaskError>, serializer: S) -> Result<S::Ok, S::Error> {
    match cause {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

impl IndexedFailure {
    /// Whether this entry records a failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.cause.is_some()
    }
}

/// Handles launched by [`launch_all`], in input order.
pub struct FanOut<T> {
    lifecycle: Arc<Lifecycle>,
    handles: Vec<TaskHandle<T>>,
}

impl<T> fmt::Debug for FanOut<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanOut")
            .field("owner", &self.lifecycle.name())
            .field("handles", &self.handles)
            .finish()
    }
}

impl<T: Send + 'static> FanOut<T> {
    /// The handles, in input order.
    #[must_use]
    pub fn handles(&self) -> &[TaskHandle<T>] {
        &self.handles
    }

    /// Take the handles, in input order.
    #[must_use]
    pub fn into_handles(self) -> Vec<TaskHandle<T>> {
        self.handles
    }

    /// Report every task's outcome by position once all have completed.
    pub fn on_error(&self, on_error_list: impl FnOnce(Vec<IndexedFailure>) + Send + 'static) {
        on_error(&self.handles, on_error_list);
    }
}

impl<T: Clone + Send + 'static> FanOut<T> {
    /// [`collect`] with the collector itself bound to the owner.
    pub fn collect(
        &self,
        on_result: impl FnOnce(Vec<Result<T, TaskError>>) + Send + 'static,
    ) -> TaskHandle<()> {
        let collector = collect(&self.handles, on_result);
        register_auto_unbind(&self.lifecycle, &collector, CancelOn::Destroy);
        collector
    }
}

/// Launch every piece of work on the promise pool, each bound to `owner`.
///
/// # Errors
///
/// Returns [`BindError::NoLifecycle`] if the owner has no lifecycle; nothing
/// is launched then.
pub fn launch_all<O, T, E, F, I>(owner: &O, tasks: I) -> Result<FanOut<T>, BindError>
where
    O: LifecycleOwner + ?Sized,
    T: Send + 'static,
    E: Into<anyhow::Error>,
    F: Future<Output = Result<T, E>> + Send + 'static,
    I: IntoIterator<Item = F>,
{
    let lifecycle = owner.lifecycle().ok_or(BindError::NoLifecycle)?;
    let dispatcher = Schedulers::global().promise();
    let handles: Vec<TaskHandle<T>> = tasks
        .into_iter()
        .map(|work| {
            let handle = spawn_lazy_with(
                Arc::clone(&dispatcher),
                "fanout",
                work.map(|r| r.map_err(TaskError::failed)),
            );
            register_auto_unbind(&lifecycle, &handle, CancelOn::Destroy);
            handle.start();
            handle
        })
        .collect();
    debug!(owner = lifecycle.name(), tasks = handles.len(), "fan-out launched");
    Ok(FanOut { lifecycle, handles })
}

/// Wait for every handle on the main scheduler, then call `on_result` once
/// with the outcomes in input order.
pub fn collect<T>(
    handles: &[TaskHandle<T>],
    on_result: impl FnOnce(Vec<Result<T, TaskError>>) + Send + 'static,
) -> TaskHandle<()>
where
    T: Clone + Send + 'static,
{
    let handles = handles.to_vec();
    for handle in &handles {
        handle.mark_error_observed();
    }
    let collector = spawn_lazy_with(Schedulers::global().main(), "collect", async move {
        let mut results = Vec::with_capacity(handles.len());
        for handle in &handles {
            results.push(handle.join().await);
        }
        on_result(results);
        Ok(())
    });
    collector.start();
    collector
}

fn deliver(on_error_list: impl FnOnce(Vec<IndexedFailure>) + Send + 'static, list: Vec<IndexedFailure>) {
    let main = Schedulers::global().main_thread();
    if let Err(rejected) = main.run_or_post(move || on_error_list(list)) {
        error!(error = %rejected, "failed to deliver fan-out errors");
    }
}

/// Once every handle has completed, call `on_error_list` on the main
/// scheduler with one entry per handle, sorted by input index.
///
/// Successful tasks are included with `cause: None`. An empty input reports an
/// empty list straight away.
pub fn on_error<T>(handles: &[TaskHandle<T>], on_error_list: impl FnOnce(Vec<IndexedFailure>) + Send + 'static)
where
    T: Send + 'static,
{
    if handles.is_empty() {
        deliver(on_error_list, Vec::new());
        return;
    }
    let slots: Arc<Mutex<Vec<Option<IndexedFailure>>>> = Arc::new(Mutex::new(vec![None; handles.len()]));
    let pending = Arc::new(AtomicUsize::new(handles.len()));
    let callback = Arc::new(Mutex::new(Some(on_error_list)));

    for (index, handle) in handles.iter().enumerate() {
        handle.mark_error_observed();
        let slots = Arc::clone(&slots);
        let pending = Arc::clone(&pending);
        let callback = Arc::clone(&callback);
        handle.on_finish(move |failure| {
            slots.lock()[index] = Some(IndexedFailure {
                index,
                cause: failure.cloned(),
            });
            if pending.fetch_sub(1, Ordering::AcqRel) != 1 {
                return;
            }
            let list: Vec<IndexedFailure> = std::mem::take(&mut *slots.lock()).into_iter().flatten().collect();
            if let Some(on_error_list) = callback.lock().take() {
                deliver(on_error_list, list);
            }
        });
    }
}

/// Wait for every handle and return the values in input order, or the first
/// failure by position.
///
/// # Errors
///
/// Returns the failure of the lowest-indexed task that did not resolve.
pub async fn await_all<T>(handles: &[TaskHandle<T>]) -> Result<Vec<T>, TaskError>
where
    T: Clone + Send + 'static,
{
    let mut values = Vec::with_capacity(handles.len());
    for handle in handles {
        values.push(handle.join().await?);
    }
    Ok(values)
}
