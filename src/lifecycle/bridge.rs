//! Binding task lifetimes to owner lifecycles and view attachment.
//!
//! Observer registration and removal run on the main scheduler. A removal
//! requested from the main thread runs inline and may precede a registration
//! still queued there, so a registration whose task has already finished is
//! dropped instead of inserted.

use std::sync::{Arc, Weak};

use tracing::{debug, error};

use crate::core::error::{BindError, CancelCause, TaskError};
use crate::core::scope::TaskScope;
use crate::core::task::{AsTaskControl, ListenerId, TaskControl};
use crate::scheduler::{Dispatcher, Schedulers};

use super::owner::{next_observer_id, Lifecycle, LifecycleEvent, LifecycleObserver, LifecycleOwner, ObserverId};
use super::view::{AttachStateListener, View};

/// Which owner event cancels a bound task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelOn {
    /// Cancel when the owner stops (or is destroyed).
    Stop,
    /// Cancel when the owner is destroyed.
    #[default]
    Destroy,
}

impl CancelOn {
    const fn matches(self, event: LifecycleEvent) -> bool {
        match self {
            Self::Stop => matches!(event, LifecycleEvent::Stop | LifecycleEvent::Destroy),
            Self::Destroy => matches!(event, LifecycleEvent::Destroy),
        }
    }
}

struct CancelTaskObserver {
    task: Arc<dyn TaskControl>,
    trigger: CancelOn,
}

impl LifecycleObserver for CancelTaskObserver {
    fn on_event(&self, event: LifecycleEvent) {
        if self.trigger.matches(event) && !self.task.is_finished() {
            debug!(task_id = self.task.id(), ?event, "cancelling task bound to owner");
            self.task.cancel_with(CancelCause::Lifecycle(event));
        }
    }
}

fn on_main(job: impl FnOnce() + Send + 'static) {
    let main = Schedulers::global().main_thread();
    if main.is_closed() {
        job();
        return;
    }
    if let Err(rejected) = main.run_or_post(job) {
        error!(error = %rejected, "failed to post lifecycle registration");
    }
}

/// A registered cancellation observer. Holds the owner weakly.
#[derive(Clone)]
pub struct Binding {
    lifecycle: Weak<Lifecycle>,
    observer: ObserverId,
}

impl Binding {
    /// Identifier of the registered observer.
    #[must_use]
    pub const fn observer_id(&self) -> ObserverId {
        self.observer
    }

    /// Remove the observer from the owner, on the main scheduler.
    pub fn unbind(&self) {
        let lifecycle = Weak::clone(&self.lifecycle);
        let id = self.observer;
        on_main(move || {
            if let Some(lifecycle) = lifecycle.upgrade() {
                lifecycle.remove_observer(id);
            }
        });
    }
}

pub(crate) fn register(lifecycle: &Arc<Lifecycle>, task: Arc<dyn TaskControl>, trigger: CancelOn) -> Binding {
    let id = next_observer_id();
    let observer = Arc::new(CancelTaskObserver {
        task: Arc::clone(&task),
        trigger,
    });
    let target = Arc::clone(lifecycle);
    on_main(move || {
        if task.is_finished() {
            debug!(task_id = task.id(), owner = target.name(), "task finished before registration");
            return;
        }
        if !target.insert_observer(id, observer) {
            debug!(task_id = task.id(), owner = target.name(), "owner already destroyed");
            task.cancel_with(CancelCause::Lifecycle(LifecycleEvent::Destroy));
        }
    });
    Binding {
        lifecycle: Arc::downgrade(lifecycle),
        observer: id,
    }
}

pub(crate) fn register_auto_unbind(
    lifecycle: &Arc<Lifecycle>,
    task: &(impl AsTaskControl + ?Sized),
    trigger: CancelOn,
) -> Binding {
    let control = task.control();
    let binding = register(lifecycle, Arc::clone(&control), trigger);
    let unbind = binding.clone();
    control.on_finish(Box::new(move |_: Option<&TaskError>| unbind.unbind()));
    binding
}

/// Cancel `task` when `owner` emits the event selected by `trigger`.
///
/// # Errors
///
/// Returns [`BindError::NoLifecycle`] if the owner has no lifecycle.
pub fn bind_until<O, T>(owner: &O, task: &T, trigger: CancelOn) -> Result<Binding, BindError>
where
    O: LifecycleOwner + ?Sized,
    T: AsTaskControl + ?Sized,
{
    let lifecycle = owner.lifecycle().ok_or(BindError::NoLifecycle)?;
    Ok(register(&lifecycle, task.control(), trigger))
}

/// Cancel `task` when `owner` is destroyed.
///
/// The observer stays registered until the owner is destroyed or the binding
/// is explicitly unbound; prefer [`bind_auto_unbind`] for long-lived owners.
///
/// # Errors
///
/// Returns [`BindError::NoLifecycle`] if the owner has no lifecycle.
pub fn bind<O, T>(owner: &O, task: &T) -> Result<Binding, BindError>
where
    O: LifecycleOwner + ?Sized,
    T: AsTaskControl + ?Sized,
{
    bind_until(owner, task, CancelOn::Destroy)
}

/// Like [`bind`], and removes the observer once `task` finishes for any
/// reason.
///
/// # Errors
///
/// Returns [`BindError::NoLifecycle`] if the owner has no lifecycle.
pub fn bind_auto_unbind<O, T>(owner: &O, task: &T) -> Result<Binding, BindError>
where
    O: LifecycleOwner + ?Sized,
    T: AsTaskControl + ?Sized,
{
    let lifecycle = owner.lifecycle().ok_or(BindError::NoLifecycle)?;
    Ok(register_auto_unbind(&lifecycle, task, CancelOn::Destroy))
}

struct CancelOnDetach {
    id: ListenerId,
    task: Arc<dyn TaskControl>,
}

impl AttachStateListener for CancelOnDetach {
    fn on_detached(&self, view: &View) {
        self.task.cancel_with(CancelCause::Detached);
        view.remove_listener(self.id);
    }
}

/// Cancel `task` when `view` is detached from its window.
///
/// The listener removes itself after firing once, and is pruned as soon as
/// the task finishes.
pub fn bind_to_view_attachment<T>(view: &Arc<View>, task: &T) -> ListenerId
where
    T: AsTaskControl + ?Sized,
{
    let control = task.control();
    let id = next_observer_id();
    view.insert_listener(
        id,
        Arc::new(CancelOnDetach {
            id,
            task: Arc::clone(&control),
        }),
    );
    let weak_view = Arc::downgrade(view);
    control.on_finish(Box::new(move |_: Option<&TaskError>| {
        if let Some(view) = weak_view.upgrade() {
            view.remove_listener(id);
        }
    }));
    id
}

/// A scope cancelled when `owner` is destroyed.
///
/// The owner's observer is removed once the scope is cancelled.
///
/// # Errors
///
/// Returns [`BindError::NoLifecycle`] if the owner has no lifecycle.
pub fn acquire_lifecycle_scope<O>(owner: &O) -> Result<TaskScope, BindError>
where
    O: LifecycleOwner + ?Sized,
{
    let lifecycle = owner.lifecycle().ok_or(BindError::NoLifecycle)?;
    let scope = TaskScope::new(format!("lifecycle:{}", lifecycle.name()));
    register_auto_unbind(&lifecycle, &scope, CancelOn::Destroy);
    Ok(scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::spawn;
    use futures::executor::block_on;
    use std::time::Duration;

    fn sleeper() -> crate::core::task::TaskHandle<()> {
        spawn(Schedulers::global().promise(), async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, anyhow::Error>(())
        })
    }

    #[test]
    fn test_trigger_matching() {
        assert!(CancelOn::Stop.matches(LifecycleEvent::Stop));
        assert!(CancelOn::Stop.matches(LifecycleEvent::Destroy));
        assert!(!CancelOn::Stop.matches(LifecycleEvent::Pause));
        assert!(CancelOn::Destroy.matches(LifecycleEvent::Destroy));
        assert!(!CancelOn::Destroy.matches(LifecycleEvent::Stop));
    }

    #[test]
    fn test_stop_trigger_cancels_on_stop() {
        let lifecycle = Lifecycle::new("bridge-stop");
        let task = sleeper();
        bind_until(&lifecycle, &task, CancelOn::Stop).unwrap();
        assert!(Schedulers::global().main_thread().flush());
        lifecycle.handle_event(LifecycleEvent::Stop);
        assert!(matches!(
            block_on(task.join()),
            Err(TaskError::Cancelled(CancelCause::Lifecycle(LifecycleEvent::Stop)))
        ));
    }

    #[test]
    fn test_bind_to_destroyed_owner_cancels_immediately() {
        let lifecycle = Lifecycle::new("bridge-dead");
        lifecycle.destroy();
        let task = sleeper();
        bind(&lifecycle, &task).unwrap();
        assert!(Schedulers::global().main_thread().flush());
        assert!(task.is_cancelled());
    }

    #[test]
    fn test_missing_owner_is_an_error() {
        let task = sleeper();
        let owner: Option<Arc<Lifecycle>> = None;
        assert!(matches!(bind(&owner, &task), Err(BindError::NoLifecycle)));
        task.cancel();
    }

    #[test]
    fn test_lifecycle_scope_unbinds_when_cancelled() {
        let lifecycle = Lifecycle::new("bridge-scope");
        let scope = acquire_lifecycle_scope(&lifecycle).unwrap();
        assert!(Schedulers::global().main_thread().flush());
        assert_eq!(lifecycle.observer_count(), 1);
        scope.cancel();
        assert!(Schedulers::global().main_thread().flush());
        assert_eq!(lifecycle.observer_count(), 0);
    }
}
