//! Fixed-parallelism work-stealing pool.
//!
//! Each worker owns a LIFO deque. Jobs submitted from outside the pool land in
//! a shared injector; jobs submitted from a worker of the same pool go to that
//! worker's own deque. An idle worker first pops its own deque, then takes a
//! batch from the injector, then steals FIFO from its siblings.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use crate::config::WorkStealingConfig;
use crate::core::error::Rejected;

use super::{run_job, Dispatcher, Job, LazySlot};

/// Backstop for the idle wait; wakeups are normally signalled.
const IDLE_WAIT: Duration = Duration::from_millis(100);

static NEXT_POOL_ID: AtomicUsize = AtomicUsize::new(1);

struct LocalQueue {
    pool_id: usize,
    deque: Worker<Job>,
}

thread_local! {
    static LOCAL: RefCell<Option<LocalQueue>> = const { RefCell::new(None) };
}

struct StealingCore {
    id: usize,
    name: String,
    injector: Injector<Job>,
    stealers: Vec<Stealer<Job>>,
    shutdown: Mutex<bool>,
    wake: Condvar,
}

impl StealingCore {
    fn start(config: &WorkStealingConfig) -> Result<Arc<Self>, Rejected> {
        let parallelism = config.resolved_parallelism();
        let deques: Vec<Worker<Job>> = (0..parallelism).map(|_| Worker::new_lifo()).collect();
        let core = Arc::new(Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            name: config.name.clone(),
            injector: Injector::new(),
            stealers: deques.iter().map(Worker::stealer).collect(),
            shutdown: Mutex::new(false),
            wake: Condvar::new(),
        });

        for (index, deque) in deques.into_iter().enumerate() {
            let worker_core = Arc::clone(&core);
            thread::Builder::new()
                .name(format!("{}-{index}", config.name))
                .spawn(move || worker_core.worker_loop(index, deque))
                .map_err(|err| {
                    core.shutdown();
                    Rejected::spawn_failed(&config.name, &err)
                })?;
        }

        info!(scheduler = %config.name, parallelism, "work-stealing pool created");
        Ok(core)
    }

    fn push(&self, job: Job) {
        let leftover = LOCAL.with(|slot| match slot.borrow().as_ref() {
            Some(local) if local.pool_id == self.id => {
                local.deque.push(job);
                None
            }
            _ => Some(job),
        });
        if let Some(job) = leftover {
            self.injector.push(job);
        }
        let _guard = self.shutdown.lock();
        self.wake.notify_one();
    }

    fn has_visible_work(&self) -> bool {
        !self.injector.is_empty() || self.stealers.iter().any(|s| !s.is_empty())
    }

    fn find_job(&self, index: usize) -> Option<Job> {
        LOCAL.with(|slot| {
            let slot = slot.borrow();
            let local = &slot.as_ref()?.deque;
            if let Some(job) = local.pop() {
                return Some(job);
            }
            loop {
                match self.injector.steal_batch_and_pop(local) {
                    Steal::Success(job) => return Some(job),
                    Steal::Retry => {}
                    Steal::Empty => break,
                }
            }
            let count = self.stealers.len();
            for offset in 1..count {
                let victim = &self.stealers[(index + offset) % count];
                loop {
                    match victim.steal() {
                        Steal::Success(job) => return Some(job),
                        Steal::Retry => {}
                        Steal::Empty => break,
                    }
                }
            }
            None
        })
    }

    fn worker_loop(&self, index: usize, deque: Worker<Job>) {
        LOCAL.with(|slot| {
            *slot.borrow_mut() = Some(LocalQueue {
                pool_id: self.id,
                deque,
            });
        });
        debug!(scheduler = %self.name, worker = index, "worker started");

        loop {
            if let Some(job) = self.find_job(index) {
                run_job(&self.name, job);
                continue;
            }
            let mut shutdown = self.shutdown.lock();
            if self.has_visible_work() {
                continue;
            }
            if *shutdown {
                break;
            }
            self.wake.wait_for(&mut shutdown, IDLE_WAIT);
        }

        LOCAL.with(|slot| slot.borrow_mut().take());
        debug!(scheduler = %self.name, worker = index, "worker stopped");
    }

    fn shutdown(&self) {
        let mut shutdown = self.shutdown.lock();
        *shutdown = true;
        self.wake.notify_all();
    }
}

/// Work-stealing pool sized `max(available_parallelism - 1, 1)` by default.
pub struct WorkStealingPool {
    config: WorkStealingConfig,
    pool: LazySlot<Arc<StealingCore>>,
    closed: AtomicBool,
}

impl WorkStealingPool {
    /// Create a pool. Workers start on the first submission.
    #[must_use]
    pub const fn new(config: WorkStealingConfig) -> Self {
        Self {
            config,
            pool: LazySlot::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of workers the pool runs.
    #[must_use]
    pub fn parallelism(&self) -> usize {
        self.config.resolved_parallelism()
    }

    /// How many executors were ever created for this pool (0 or 1).
    pub fn pool_creations(&self) -> usize {
        self.pool.creations()
    }
}

impl Dispatcher for WorkStealingPool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn execute(&self, job: Job) -> Result<(), Rejected> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Rejected::shutdown(&self.config.name));
        }
        let core = self.pool.get_or_try_init(|| StealingCore::start(&self.config))?;
        if *core.shutdown.lock() {
            return Err(Rejected::shutdown(&self.config.name));
        }
        core.push(job);
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(core) = self.pool.get() {
            core.shutdown();
            info!(scheduler = %self.config.name, "work-stealing pool shut down");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for WorkStealingPool {
    fn drop(&mut self) {
        if let Some(core) = self.pool.get() {
            core.shutdown();
        }
    }
}
