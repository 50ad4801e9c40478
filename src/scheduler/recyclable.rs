//! Recyclable thread pool: core-sized, unbounded queue, idle workers reclaimed.
//!
//! # Design
//!
//! - A new worker is started for each submission while fewer than
//!   `core_threads` workers are alive; otherwise the job is queued.
//! - Workers block on the shared queue and exit after `keep_alive` without
//!   work. Core workers are not exempt.
//! - Queue pushes and the idle-exit check run under the same state lock, so a
//!   job is never stranded in the queue with no live worker.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::RecyclablePoolConfig;
use crate::core::error::Rejected;

use super::{run_job, Dispatcher, Job, LazySlot};

enum Message {
    Run(Job),
    Shutdown,
}

#[derive(Debug, Default)]
struct PoolState {
    live_workers: usize,
    shutdown: bool,
}

/// The executor behind a [`RecyclablePool`], created on first submission.
struct PoolCore {
    name: String,
    core_threads: usize,
    keep_alive: Duration,
    state: Mutex<PoolState>,
    tx: Sender<Message>,
    rx: Receiver<Message>,
    thread_seq: AtomicUsize,
}

impl PoolCore {
    fn new(config: &RecyclablePoolConfig) -> Self {
        let (tx, rx) = unbounded();
        info!(
            scheduler = %config.name,
            core_threads = config.core_threads,
            keep_alive_ms = config.keep_alive().as_millis(),
            "recyclable pool created"
        );
        Self {
            name: config.name.clone(),
            core_threads: config.core_threads,
            keep_alive: config.keep_alive(),
            state: Mutex::new(PoolState::default()),
            tx,
            rx,
            thread_seq: AtomicUsize::new(1),
        }
    }

    fn execute(self: &Arc<Self>, job: Job) -> Result<(), Rejected> {
        let mut state = self.state.lock();
        if state.shutdown {
            return Err(Rejected::shutdown(&self.name));
        }
        if state.live_workers < self.core_threads {
            state.live_workers += 1;
            let seq = self.thread_seq.fetch_add(1, Ordering::Relaxed);
            let core = Arc::clone(self);
            let spawned = thread::Builder::new()
                .name(format!("{}#{seq}", self.name))
                .spawn(move || core.worker_loop(Some(job)));
            return match spawned {
                Ok(_) => Ok(()),
                Err(err) => {
                    state.live_workers -= 1;
                    warn!(scheduler = %self.name, error = %err, "failed to start worker");
                    Err(Rejected::spawn_failed(&self.name, &err))
                }
            };
        }
        self.tx
            .send(Message::Run(job))
            .map_err(|_| Rejected::shutdown(&self.name))
    }

    fn worker_loop(&self, first: Option<Job>) {
        debug!(scheduler = %self.name, "worker started");
        if let Some(job) = first {
            run_job(&self.name, job);
        }
        loop {
            match self.rx.recv_timeout(self.keep_alive) {
                Ok(Message::Run(job)) => run_job(&self.name, job),
                Ok(Message::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                    self.state.lock().live_workers -= 1;
                    debug!(scheduler = %self.name, "worker stopped");
                    return;
                }
                Err(RecvTimeoutError::Timeout) => {
                    let mut state = self.state.lock();
                    if self.rx.is_empty() {
                        state.live_workers -= 1;
                        debug!(scheduler = %self.name, "idle worker reclaimed");
                        return;
                    }
                }
            }
        }
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        if state.shutdown {
            return;
        }
        state.shutdown = true;
        for _ in 0..state.live_workers {
            let _ = self.tx.send(Message::Shutdown);
        }
        info!(scheduler = %self.name, live_workers = state.live_workers, "recyclable pool shut down");
    }
}

/// Pool with a minimum worker count, unbounded maximum queue and idle
/// reclamation. Backs promise and flow dispatch.
///
/// Closing shuts the executor down: jobs already queued still run, later
/// submissions are rejected.
pub struct RecyclablePool {
    config: RecyclablePoolConfig,
    pool: LazySlot<PoolCore>,
    closed: AtomicBool,
}

impl RecyclablePool {
    /// Create a pool. No thread is started until the first submission.
    #[must_use]
    pub const fn new(config: RecyclablePoolConfig) -> Self {
        Self {
            config,
            pool: LazySlot::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Pool configuration.
    #[must_use]
    pub const fn config(&self) -> &RecyclablePoolConfig {
        &self.config
    }

    /// Workers currently alive.
    pub fn live_workers(&self) -> usize {
        self.pool.get().map_or(0, |core| core.state.lock().live_workers)
    }

    /// Jobs waiting in the queue.
    pub fn queued_jobs(&self) -> usize {
        self.pool.get().map_or(0, |core| core.rx.len())
    }

    /// How many executors were ever created for this pool (0 or 1).
    pub fn pool_creations(&self) -> usize {
        self.pool.creations()
    }

    fn core(&self) -> Arc<PoolCore> {
        self.pool.get_or_init(|| PoolCore::new(&self.config))
    }
}

impl Dispatcher for RecyclablePool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn execute(&self, job: Job) -> Result<(), Rejected> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Rejected::shutdown(&self.config.name));
        }
        self.core().execute(job)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(core) = self.pool.get() {
            core.shutdown();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for RecyclablePool {
    fn drop(&mut self) {
        if let Some(core) = self.pool.get() {
            core.shutdown();
        }
    }
}
