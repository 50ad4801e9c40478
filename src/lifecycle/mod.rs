//! Owner lifecycles and the bridge that cancels tasks when owners tear down.
//!
//! An owner never owns its tasks. It only holds the authority to cancel them:
//! the owner's [`Lifecycle`] keeps a map of observers, each holding a task's
//! control object, while tasks refer back to the lifecycle weakly.

pub mod bridge;
pub mod owner;
pub mod view;

pub use bridge::{
    acquire_lifecycle_scope, bind, bind_auto_unbind, bind_to_view_attachment, bind_until, Binding,
    CancelOn,
};
pub use owner::{
    Lifecycle, LifecycleEvent, LifecycleObserver, LifecycleOwner, LifecycleState, ObserverId,
};
pub use view::{AttachStateListener, View};
