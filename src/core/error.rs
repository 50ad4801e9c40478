//! Error types for scheduling, task execution and lifecycle binding.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::lifecycle::LifecycleEvent;

/// Why a scheduler refused a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The scheduler was closed.
    Shutdown,
    /// The OS refused to start a worker thread.
    SpawnFailed(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown => write!(f, "scheduler is shut down"),
            Self::SpawnFailed(msg) => write!(f, "failed to spawn worker: {msg}"),
        }
    }
}

/// A scheduler could not accept new work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("scheduler `{scheduler}` rejected the task: {reason}")]
pub struct Rejected {
    /// Name of the rejecting scheduler.
    pub scheduler: String,
    /// Reason for the rejection.
    pub reason: RejectReason,
}

impl Rejected {
    /// Rejection caused by a closed scheduler.
    pub fn shutdown(scheduler: impl Into<String>) -> Self {
        Self {
            scheduler: scheduler.into(),
            reason: RejectReason::Shutdown,
        }
    }

    /// Rejection caused by a failed thread spawn.
    pub fn spawn_failed(scheduler: impl Into<String>, err: &std::io::Error) -> Self {
        Self {
            scheduler: scheduler.into(),
            reason: RejectReason::SpawnFailed(err.to_string()),
        }
    }
}

/// What cancelled a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CancelCause {
    /// `cancel()` was called on the handle.
    #[error("cancelled by caller")]
    Requested,
    /// The bound owner lifecycle emitted the given event.
    #[error("owner lifecycle emitted {0:?}")]
    Lifecycle(LifecycleEvent),
    /// The bound view was detached from its window.
    #[error("view detached from window")]
    Detached,
    /// The parent scope was cancelled.
    #[error("parent scope cancelled")]
    Scope,
    /// The scheduler rejected the task.
    #[error("the task was rejected: {0}")]
    Rejected(#[source] Rejected),
}

/// Terminal failure of a task.
///
/// Cheap to clone: user failures are shared behind an `Arc` so the same cause
/// can be delivered to every completion listener.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// The task was cancelled before it produced a value.
    #[error("task cancelled: {0}")]
    Cancelled(CancelCause),
    /// User work returned an error.
    #[error("task failed: {0}")]
    Failed(Arc<anyhow::Error>),
    /// User work panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Wrap a user error.
    pub fn failed(err: impl Into<anyhow::Error>) -> Self {
        Self::Failed(Arc::new(err.into()))
    }

    /// Whether this is a cancellation rather than a fault.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Whether the cancellation was caused by a scheduler rejection.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Cancelled(CancelCause::Rejected(_)))
    }
}

/// Binding a task to an owner failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// The owner exposes no lifecycle.
    #[error("no lifecycle available for owner")]
    NoLifecycle,
}

/// Invalid countdown configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Start value lies below the end value.
    #[error("start count ({start}) must not be below end count ({end})")]
    StartBelowEnd {
        /// Configured start.
        start: i64,
        /// Configured end.
        end: i64,
    },
    /// Negative tick interval.
    #[error("invalid interval: {0} ms")]
    NegativeInterval(i64),
}

/// Errors produced while configuring or installing schedulers.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A job was rejected.
    #[error(transparent)]
    Rejected(#[from] Rejected),
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The process-wide registry was already initialised.
    #[error("schedulers already installed")]
    AlreadyInstalled,
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
