//! Tests for builder modules

use lifecycle_scheduler::builders::build_schedulers;
use lifecycle_scheduler::config::{RecyclablePoolConfig, RuntimeConfig};
use lifecycle_scheduler::core::SchedulerError;
use lifecycle_scheduler::scheduler::Dispatcher;

#[test]
fn test_build_schedulers_defaults() {
    let schedulers = build_schedulers(&RuntimeConfig::default()).unwrap();
    assert_eq!(schedulers.promise().name(), "promise");
    assert_eq!(schedulers.flow().name(), "flow");
    assert_eq!(schedulers.io().name(), "io");
    assert_eq!(schedulers.main().name(), "main");
    // nothing is started until the first submission
    assert_eq!(schedulers.promise_pool().pool_creations(), 0);
    assert_eq!(schedulers.io_pool().pool_creations(), 0);
    schedulers.close_all();
}

#[test]
fn test_build_schedulers_rejects_invalid_config() {
    let mut config = RuntimeConfig::default();
    config.promise = RecyclablePoolConfig::new("promise").with_core_threads(0);
    assert!(matches!(
        build_schedulers(&config),
        Err(SchedulerError::InvalidConfig(_))
    ));
}

#[test]
fn test_closed_registry_rejects_work() {
    let schedulers = build_schedulers(&RuntimeConfig::default()).unwrap();
    schedulers.close_all();
    assert!(schedulers.promise().execute(Box::new(|| {})).is_err());
    assert!(schedulers.io().execute(Box::new(|| {})).is_err());
    assert!(schedulers.main().execute(Box::new(|| {})).is_err());
}
