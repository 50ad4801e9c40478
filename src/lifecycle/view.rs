//! Window attachment state of a UI element.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::core::scope::TaskScope;
use crate::core::task::ListenerId;

use super::bridge::bind_to_view_attachment;
use super::owner::next_observer_id;

/// Receives attach/detach transitions of a [`View`].
pub trait AttachStateListener: Send + Sync {
    /// The view was attached to a window.
    fn on_attached(&self, _view: &View) {}

    /// The view was detached from its window.
    fn on_detached(&self, view: &View);
}

struct ViewInner {
    attached: bool,
    listeners: BTreeMap<ListenerId, Arc<dyn AttachStateListener>>,
}

/// A UI element that can be attached to and detached from a window.
pub struct View {
    name: String,
    inner: Mutex<ViewInner>,
}

impl View {
    /// New, detached view.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            inner: Mutex::new(ViewInner {
                attached: false,
                listeners: BTreeMap::new(),
            }),
        })
    }

    /// View name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the view is attached to a window.
    pub fn is_attached(&self) -> bool {
        self.inner.lock().attached
    }

    fn snapshot(&self, attached: bool) -> Option<Vec<Arc<dyn AttachStateListener>>> {
        let mut inner = self.inner.lock();
        if inner.attached == attached {
            return None;
        }
        inner.attached = attached;
        Some(inner.listeners.values().cloned().collect())
    }

    /// Attach the view. No-op when already attached.
    pub fn attach(&self) {
        if let Some(listeners) = self.snapshot(true) {
            debug!(view = %self.name, listeners = listeners.len(), "view attached");
            for listener in listeners {
                listener.on_attached(self);
            }
        }
    }

    /// Detach the view. No-op when already detached.
    pub fn detach(&self) {
        if let Some(listeners) = self.snapshot(false) {
            debug!(view = %self.name, listeners = listeners.len(), "view detached");
            for listener in listeners {
                listener.on_detached(self);
            }
        }
    }

    /// Register a listener.
    pub fn add_listener(&self, listener: Arc<dyn AttachStateListener>) -> ListenerId {
        let id = next_observer_id();
        self.insert_listener(id, listener);
        id
    }

    pub(crate) fn insert_listener(&self, id: ListenerId, listener: Arc<dyn AttachStateListener>) {
        self.inner.lock().listeners.insert(id, listener);
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.lock().listeners.remove(&id).is_some()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    /// A scope cancelled the next time this view is detached.
    pub fn acquire_observable_scope(self: &Arc<Self>) -> TaskScope {
        let scope = TaskScope::new(format!("view:{}", self.name));
        bind_to_view_attachment(self, &scope);
        scope
    }
}
