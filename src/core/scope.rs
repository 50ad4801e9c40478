//! Task scopes: a cancellable parent for many independent tasks.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::core::error::{CancelCause, TaskError};
use crate::core::task::{
    spawn_lazy_with, AsTaskControl, FinishListener, ListenerId, TaskControl, TaskHandle, TaskId,
};
use crate::scheduler::Dispatcher;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SCOPE_LISTENER: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct ScopeState {
    cancelled: Option<CancelCause>,
    children: HashMap<TaskId, Arc<dyn TaskControl>>,
    listeners: Vec<(ListenerId, FinishListener)>,
}

struct ScopeInner {
    id: TaskId,
    name: String,
    state: Mutex<ScopeState>,
}

impl ScopeInner {
    fn cancel(&self, cause: CancelCause) -> bool {
        let (children, listeners) = {
            let mut state = self.state.lock();
            if state.cancelled.is_some() {
                return false;
            }
            state.cancelled = Some(cause.clone());
            (
                std::mem::take(&mut state.children),
                std::mem::take(&mut state.listeners),
            )
        };
        debug!(scope = %self.name, children = children.len(), "scope cancelled");
        for child in children.into_values() {
            child.cancel_with(CancelCause::Scope);
        }
        let err = TaskError::Cancelled(cause);
        for (_, listener) in listeners {
            listener(Some(&err));
        }
        true
    }
}

impl TaskControl for ScopeInner {
    fn id(&self) -> TaskId {
        self.id
    }

    fn cancel_with(&self, cause: CancelCause) -> bool {
        self.cancel(cause)
    }

    fn is_finished(&self) -> bool {
        self.state.lock().cancelled.is_some()
    }

    fn on_finish(&self, listener: FinishListener) -> ListenerId {
        let id = NEXT_SCOPE_LISTENER.fetch_add(1, Ordering::Relaxed);
        let cause = {
            let mut state = self.state.lock();
            match state.cancelled.clone() {
                None => {
                    state.listeners.push((id, listener));
                    return id;
                }
                Some(cause) => cause,
            }
        };
        listener(Some(&TaskError::Cancelled(cause)));
        id
    }

    fn remove_finish_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(listener_id, _)| *listener_id != id);
        state.listeners.len() != before
    }
}

/// A cancellable group of tasks.
///
/// Children are independent: one failing does not affect its siblings.
/// Cancelling the scope cancels every live child, and tasks launched into a
/// cancelled scope are cancelled immediately. A scope stays alive until it is
/// cancelled; it never completes on its own.
#[derive(Clone)]
pub struct TaskScope {
    inner: Arc<ScopeInner>,
}

impl TaskScope {
    /// Create an empty scope.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                state: Mutex::new(ScopeState::default()),
            }),
        }
    }

    /// Scope name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Launch fallible user work on `dispatcher` as a child of this scope.
    pub fn launch<T, E, F>(&self, dispatcher: Arc<dyn Dispatcher>, future: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        E: Into<anyhow::Error>,
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.launch_with(dispatcher, "scope", async move { future.await.map_err(TaskError::failed) })
    }

    pub(crate) fn launch_with<T, F>(
        &self,
        dispatcher: Arc<dyn Dispatcher>,
        label: &'static str,
        future: F,
    ) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let handle = spawn_lazy_with(dispatcher, label, future);
        {
            let mut state = self.inner.state.lock();
            if state.cancelled.is_some() {
                drop(state);
                handle.cancel_with(CancelCause::Scope);
                return handle;
            }
            state.children.insert(handle.id(), handle.control());
        }
        let scope: Weak<ScopeInner> = Arc::downgrade(&self.inner);
        let child_id = handle.id();
        handle.on_finish(move |_| {
            if let Some(scope) = scope.upgrade() {
                scope.state.lock().children.remove(&child_id);
            }
        });
        handle.start();
        handle
    }

    /// Cancel the scope and every live child. Idempotent.
    pub fn cancel(&self) -> bool {
        self.inner.cancel(CancelCause::Requested)
    }

    /// Whether the scope has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_finished()
    }

    /// Children that have not finished yet.
    #[must_use]
    pub fn active_tasks(&self) -> usize {
        self.inner.state.lock().children.len()
    }
}

impl AsTaskControl for TaskScope {
    fn control(&self) -> Arc<dyn TaskControl> {
        Arc::clone(&self.inner) as Arc<dyn TaskControl>
    }
}
