//! Tests for tokio runtime adapters

use std::sync::Arc;
use std::time::Duration;

use lifecycle_scheduler::core::spawn;
use lifecycle_scheduler::runtime::{handle, TokioDispatcher};
use lifecycle_scheduler::scheduler::Dispatcher;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_dispatcher_runs_jobs() {
    let dispatcher = TokioDispatcher::current("tokio").expect("inside runtime");

    let (tx, rx) = tokio::sync::oneshot::channel();
    dispatcher
        .execute(Box::new(move || {
            tx.send(123).unwrap();
        }))
        .unwrap();

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_task_handle_on_tokio_dispatcher() {
    let dispatcher: Arc<dyn Dispatcher> = Arc::new(TokioDispatcher::current("tokio-task").unwrap());
    let handle = spawn(dispatcher, async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok::<_, anyhow::Error>("slept")
    });
    assert_eq!(handle.join().await.unwrap(), "slept");
}

#[test]
fn test_timer_driver_is_available() {
    assert!(handle().is_some());
}
