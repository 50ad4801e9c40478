//! Lifecycle owners, events and observers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identifier of a registered observer.
pub type ObserverId = u64;

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_observer_id() -> ObserverId {
    NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Transition signals emitted by an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// Owner created.
    Create,
    /// Owner became visible.
    Start,
    /// Owner gained focus.
    Resume,
    /// Owner lost focus.
    Pause,
    /// Owner is no longer visible.
    Stop,
    /// Owner is being torn down.
    Destroy,
}

/// Current state of an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Torn down; terminal.
    Destroyed,
    /// Constructed, no event yet.
    Initialized,
    /// After `Create` or `Stop`.
    Created,
    /// After `Start` or `Pause`.
    Started,
    /// After `Resume`.
    Resumed,
}

impl LifecycleEvent {
    /// State reached after this event.
    #[must_use]
    pub const fn target_state(self) -> LifecycleState {
        match self {
            Self::Create | Self::Stop => LifecycleState::Created,
            Self::Start | Self::Pause => LifecycleState::Started,
            Self::Resume => LifecycleState::Resumed,
            Self::Destroy => LifecycleState::Destroyed,
        }
    }
}

/// Receives lifecycle events.
pub trait LifecycleObserver: Send + Sync {
    /// Called for each event after the owner's state has been updated.
    fn on_event(&self, event: LifecycleEvent);
}

struct LifecycleInner {
    state: LifecycleState,
    observers: BTreeMap<ObserverId, Arc<dyn LifecycleObserver>>,
}

/// Event source of an owner, with its observer map.
///
/// On `Destroy` every observer is notified once and the map is cleared; later
/// registrations are refused.
pub struct Lifecycle {
    name: String,
    inner: Mutex<LifecycleInner>,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Lifecycle")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("observers", &inner.observers.len())
            .finish()
    }
}

impl Lifecycle {
    /// New lifecycle in [`LifecycleState::Initialized`].
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            inner: Mutex::new(LifecycleInner {
                state: LifecycleState::Initialized,
                observers: BTreeMap::new(),
            }),
        })
    }

    /// Owner name, used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        self.inner.lock().state
    }

    /// Whether the owner has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.state() == LifecycleState::Destroyed
    }

    /// Register an observer. Returns `None` if the owner is destroyed.
    pub fn add_observer(&self, observer: Arc<dyn LifecycleObserver>) -> Option<ObserverId> {
        let id = next_observer_id();
        self.insert_observer(id, observer).then_some(id)
    }

    pub(crate) fn insert_observer(&self, id: ObserverId, observer: Arc<dyn LifecycleObserver>) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == LifecycleState::Destroyed {
            return false;
        }
        inner.observers.insert(id, observer);
        true
    }

    /// Remove an observer. Returns `false` if it was not registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.inner.lock().observers.remove(&id).is_some()
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }

    /// Apply an event and notify observers in registration order.
    ///
    /// Events after `Destroy` are ignored.
    pub fn handle_event(&self, event: LifecycleEvent) {
        let observers: Vec<Arc<dyn LifecycleObserver>> = {
            let mut inner = self.inner.lock();
            if inner.state == LifecycleState::Destroyed {
                return;
            }
            inner.state = event.target_state();
            if event == LifecycleEvent::Destroy {
                std::mem::take(&mut inner.observers).into_values().collect()
            } else {
                inner.observers.values().cloned().collect()
            }
        };
        debug!(owner = %self.name, ?event, observers = observers.len(), "lifecycle event");
        for observer in observers {
            observer.on_event(event);
        }
    }

    /// Shorthand for `handle_event(LifecycleEvent::Destroy)`.
    pub fn destroy(&self) {
        self.handle_event(LifecycleEvent::Destroy);
    }
}

/// Something that may expose a lifecycle.
pub trait LifecycleOwner {
    /// The owner's lifecycle, if one can be resolved.
    fn lifecycle(&self) -> Option<Arc<Lifecycle>>;
}

impl LifecycleOwner for Arc<Lifecycle> {
    fn lifecycle(&self) -> Option<Arc<Lifecycle>> {
        Some(Arc::clone(self))
    }
}

impl<O: LifecycleOwner + ?Sized> LifecycleOwner for &O {
    fn lifecycle(&self) -> Option<Arc<Lifecycle>> {
        (**self).lifecycle()
    }
}

impl<O: LifecycleOwner> LifecycleOwner for Option<O> {
    fn lifecycle(&self) -> Option<Arc<Lifecycle>> {
        self.as_ref().and_then(LifecycleOwner::lifecycle)
    }
}
