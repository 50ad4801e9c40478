//! Tests for error types

use lifecycle_scheduler::core::{
    BindError, CancelCause, RejectReason, Rejected, SchedulerError, TaskError, ValidationError,
};
use lifecycle_scheduler::lifecycle::LifecycleEvent;

#[test]
fn test_rejected_shutdown_error() {
    let err = Rejected::shutdown("promise");
    assert_eq!(err.reason, RejectReason::Shutdown);
    assert_eq!(
        format!("{}", err),
        "scheduler `promise` rejected the task: scheduler is shut down"
    );
}

#[test]
fn test_spawn_failed_error() {
    let io = std::io::Error::other("no more threads");
    let err = Rejected::spawn_failed("io", &io);
    assert_eq!(err.reason, RejectReason::SpawnFailed("no more threads".to_string()));
}

#[test]
fn test_cancel_cause_display() {
    let err = TaskError::Cancelled(CancelCause::Lifecycle(LifecycleEvent::Destroy));
    assert_eq!(format!("{}", err), "task cancelled: owner lifecycle emitted Destroy");
    assert!(err.is_cancelled());
}

#[test]
fn test_bind_error() {
    assert_eq!(format!("{}", BindError::NoLifecycle), "no lifecycle available for owner");
}

#[test]
fn test_scheduler_error_from_rejection() {
    let err: SchedulerError = Rejected::shutdown("flow").into();
    assert!(matches!(err, SchedulerError::Rejected(_)));
    assert_eq!(format!("{}", SchedulerError::AlreadyInstalled), "schedulers already installed");
}

#[test]
fn test_validation_error_equality() {
    assert_eq!(ValidationError::NegativeInterval(-1), ValidationError::NegativeInterval(-1));
}
