//! Tokio runtime dispatcher implementation.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Handle;

use crate::core::error::Rejected;
use crate::scheduler::{run_job, Dispatcher, Job};

/// Dispatcher that executes jobs on an existing tokio runtime.
pub struct TokioDispatcher {
    name: String,
    handle: Handle,
    closed: AtomicBool,
}

impl TokioDispatcher {
    /// Create a dispatcher from a tokio runtime handle.
    pub fn new(name: impl Into<String>, handle: Handle) -> Self {
        Self {
            name: name.into(),
            handle,
            closed: AtomicBool::new(false),
        }
    }

    /// Create a dispatcher on the runtime the caller is running in.
    ///
    /// # Errors
    ///
    /// Fails when called outside a tokio runtime.
    pub fn current(name: impl Into<String>) -> Result<Self, tokio::runtime::TryCurrentError> {
        Ok(Self::new(name, Handle::try_current()?))
    }
}

impl Dispatcher for TokioDispatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, job: Job) -> Result<(), Rejected> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Rejected::shutdown(&self.name));
        }
        let name = self.name.clone();
        self.handle.spawn(async move { run_job(&name, job) });
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runs_on_current_runtime() {
        let dispatcher = TokioDispatcher::current("tokio").unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        dispatcher
            .execute(Box::new(move || {
                let _ = tx.send(42);
            }))
            .unwrap();
        assert_eq!(rx.await.unwrap(), 42);

        dispatcher.close();
        assert!(dispatcher.execute(Box::new(|| {})).is_err());
    }
}
