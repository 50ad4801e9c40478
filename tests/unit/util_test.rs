//! Tests for utility functions

use lifecycle_scheduler::util::{enable_task_debug, init_tracing, task_debug_enabled};

#[test]
fn test_task_debug_toggle() {
    enable_task_debug();
    assert!(task_debug_enabled());
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    tracing::info!("tracing initialised twice without panicking");
}
