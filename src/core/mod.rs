//! Core task abstractions: handles, scopes, errors and the future runner.

pub mod error;
pub(crate) mod exec;
pub mod scope;
pub mod task;

pub use error::{
    AppResult, BindError, CancelCause, RejectReason, Rejected, SchedulerError, TaskError,
    ValidationError,
};
pub use scope::TaskScope;
pub use task::{
    spawn, spawn_lazy, spawn_lazy_with, AsTaskControl, FinishListener, ListenerId, TaskControl,
    TaskHandle, TaskId, TaskState,
};
