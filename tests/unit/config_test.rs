//! Tests for configuration validation

use std::time::Duration;

use lifecycle_scheduler::config::scheduler::{DEFAULT_CORE_THREADS, DEFAULT_KEEP_ALIVE_SECS};
use lifecycle_scheduler::config::{RecyclablePoolConfig, RuntimeConfig, WorkStealingConfig};

#[test]
fn test_recyclable_defaults() {
    let config = RecyclablePoolConfig::new("promise");
    assert_eq!(config.core_threads, DEFAULT_CORE_THREADS);
    assert_eq!(config.keep_alive(), Duration::from_secs(DEFAULT_KEEP_ALIVE_SECS));
    assert!(config.validate().is_ok());
}

#[test]
fn test_recyclable_invalid_core_threads() {
    let invalid = RecyclablePoolConfig::new("promise").with_core_threads(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_recyclable_invalid_keep_alive() {
    let invalid = RecyclablePoolConfig::new("promise").with_keep_alive(Duration::ZERO);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_keep_alive_millis_override() {
    let config = RecyclablePoolConfig::new("flow").with_keep_alive(Duration::from_millis(250));
    assert_eq!(config.keep_alive(), Duration::from_millis(250));
}

#[test]
fn test_work_stealing_validation() {
    assert!(WorkStealingConfig::new("io").validate().is_ok());
    assert!(WorkStealingConfig::new("io").with_parallelism(0).validate().is_err());
    assert!(WorkStealingConfig::new("").validate().is_err());
}

#[test]
fn test_runtime_config_defaults() {
    let config = RuntimeConfig::default();
    assert_eq!(config.promise.name, "promise");
    assert_eq!(config.flow.name, "flow");
    assert_eq!(config.io.name, "io");
    assert!(!config.debug);
    assert!(config.validate().is_ok());
}

#[test]
fn test_runtime_config_from_json() {
    let json = r#"{
        "promise": { "name": "p", "core_threads": 2, "keep_alive_secs": 5 },
        "flow": { "name": "f", "core_threads": 4, "keep_alive_secs": 10 },
        "io": { "name": "io", "parallelism": 3 },
        "main_thread_name": "ui"
    }"#;
    let config = RuntimeConfig::from_json_str(json).unwrap();
    assert_eq!(config.promise.core_threads, 2);
    assert_eq!(config.io.resolved_parallelism(), 3);
    assert_eq!(config.main_thread_name, "ui");
    assert!(!config.debug);
}

#[test]
fn test_runtime_config_from_json_invalid() {
    let json = r#"{
        "promise": { "name": "p", "core_threads": 0, "keep_alive_secs": 5 },
        "flow": { "name": "f", "core_threads": 4, "keep_alive_secs": 10 },
        "io": { "name": "io" },
        "main_thread_name": "ui"
    }"#;
    let err = RuntimeConfig::from_json_str(json).unwrap_err();
    assert!(err.contains("promise"), "{err}");
    assert!(RuntimeConfig::from_json_str("not json").is_err());
}
