//! Pausable countdown.
//!
//! A countdown ticks from its start value down to its end value, one unit per
//! `interval * unit factor` milliseconds. Pausing cancels the driving task and
//! keeps the last delivered value; resuming starts a new driving task from
//! that value. Each driving task carries a generation number, so a task that
//! was paused or cancelled can never deliver a stale tick.

mod builder;
mod state;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::error::TaskError;
use crate::core::task::{spawn_lazy_with, TaskHandle};
use crate::scheduler::{Dispatcher, Schedulers};

pub use builder::CountdownBuilder;
pub use state::{CountdownState, TimeUnit};

type StartCallback = Arc<dyn Fn() + Send + Sync>;
type TickCallback = Arc<dyn Fn(i64) + Send + Sync>;
type CompleteCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    start: Option<StartCallback>,
    tick: Option<TickCallback>,
    complete: Option<CompleteCallback>,
}

struct Core {
    state: CountdownState,
    remaining: i64,
    generation: u64,
    announced: bool,
    cancelled: bool,
    task: Option<TaskHandle<()>>,
    callbacks: Callbacks,
}

struct Shared {
    start: i64,
    end: i64,
    unit: TimeUnit,
    interval_ms: u64,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    core: Mutex<Core>,
}

enum Step {
    Stale,
    Tick(Option<TickCallback>, Option<CompleteCallback>),
}

impl Shared {
    fn step(&self) -> Duration {
        Duration::from_millis(self.interval_ms.saturating_mul(self.unit.factor()))
    }

    /// The start callback is owed to the first driving task that runs, even
    /// when the countdown was paused before that.
    fn enter(&self, generation: u64) -> Option<Option<StartCallback>> {
        let mut core = self.core.lock();
        if core.generation != generation {
            return None;
        }
        if core.announced {
            return Some(None);
        }
        core.announced = true;
        Some(core.callbacks.start.clone())
    }

    fn tick(&self, generation: u64, value: i64) -> Step {
        let mut core = self.core.lock();
        if core.generation != generation {
            return Step::Stale;
        }
        core.state = CountdownState::Dispatch;
        core.remaining = value;
        let tick = core.callbacks.tick.clone();
        if value > self.end {
            return Step::Tick(tick, None);
        }
        core.state = CountdownState::Complete;
        core.task = None;
        let callbacks = std::mem::take(&mut core.callbacks);
        Step::Tick(tick, callbacks.complete)
    }

    fn settle(&self, generation: u64) {
        let mut core = self.core.lock();
        if core.generation == generation && core.state == CountdownState::Dispatch {
            core.state = CountdownState::Resume;
        }
    }
}

async fn drive(shared: Arc<Shared>, generation: u64, from: i64) -> Result<(), TaskError> {
    let Some(on_start) = shared.enter(generation) else {
        return Ok(());
    };
    if let Some(on_start) = on_start {
        on_start();
    }
    let step = shared.step();
    let mut value = from;
    while value > shared.end {
        tokio::time::sleep(step).await;
        value -= 1;
        match shared.tick(generation, value) {
            Step::Stale => return Ok(()),
            Step::Tick(on_tick, on_complete) => {
                if let Some(on_tick) = on_tick {
                    on_tick(value);
                }
                match on_complete {
                    Some(on_complete) => {
                        debug!(end = shared.end, "countdown complete");
                        on_complete();
                    }
                    None => shared.settle(generation),
                }
            }
        }
    }
    Ok(())
}

/// A countdown built by [`CountdownBuilder`]. Clones share the same timer.
#[derive(Clone)]
pub struct CountdownTimer {
    shared: Arc<Shared>,
}

impl fmt::Debug for CountdownTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.shared.core.lock();
        f.debug_struct("CountdownTimer")
            .field("start", &self.shared.start)
            .field("end", &self.shared.end)
            .field("unit", &self.shared.unit)
            .field("state", &core.state)
            .field("remaining", &core.remaining)
            .finish_non_exhaustive()
    }
}

impl CountdownTimer {
    pub(crate) fn new(
        start: i64,
        end: i64,
        unit: TimeUnit,
        interval_ms: u64,
        dispatcher: Option<Arc<dyn Dispatcher>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                start,
                end,
                unit,
                interval_ms,
                dispatcher,
                core: Mutex::new(Core {
                    state: CountdownState::Initial,
                    remaining: start,
                    generation: 0,
                    announced: false,
                    cancelled: false,
                    task: None,
                    callbacks: Callbacks::default(),
                }),
            }),
        }
    }

    /// Called once when a run starts from the start value.
    pub fn watch_start(&self, callback: impl Fn() + Send + Sync + 'static) -> &Self {
        self.shared.core.lock().callbacks.start = Some(Arc::new(callback));
        self
    }

    /// Called with the remaining value on every tick.
    pub fn watch_count_down(&self, callback: impl Fn(i64) + Send + Sync + 'static) -> &Self {
        self.shared.core.lock().callbacks.tick = Some(Arc::new(callback));
        self
    }

    /// Called once when the end value is reached.
    pub fn watch_complete(&self, callback: impl Fn() + Send + Sync + 'static) -> &Self {
        self.shared.core.lock().callbacks.complete = Some(Arc::new(callback));
        self
    }

    /// Current state.
    pub fn state(&self) -> CountdownState {
        self.shared.core.lock().state
    }

    /// Last delivered value, or the start value before the first tick.
    pub fn remaining(&self) -> i64 {
        self.shared.core.lock().remaining
    }

    /// Whether [`CountdownTimer::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.shared.core.lock().cancelled
    }

    fn launch(&self, core: &mut Core, from: i64) -> TaskHandle<()> {
        core.generation += 1;
        core.state = CountdownState::Resume;
        core.remaining = from;
        let generation = core.generation;
        let dispatcher = self
            .shared
            .dispatcher
            .clone()
            .unwrap_or_else(|| Schedulers::global().main());
        let handle = spawn_lazy_with(
            dispatcher,
            "countdown",
            drive(Arc::clone(&self.shared), generation, from),
        );
        core.task = Some(handle.clone());
        handle
    }

    /// Start counting from the start value.
    ///
    /// Returns `false` when cancelled, already running, or when the start
    /// value is already at the end value.
    pub fn start(&self) -> bool {
        let handle = {
            let mut core = self.shared.core.lock();
            if core.cancelled || core.state.is_running() {
                return false;
            }
            if self.shared.start <= self.shared.end {
                warn!(start = self.shared.start, end = self.shared.end, "countdown already completed");
                return false;
            }
            self.launch(&mut core, self.shared.start)
        };
        handle.start()
    }

    /// Suspend at the last delivered value. Legal from `Initial`, `Resume` and
    /// `Dispatch`.
    pub fn pause(&self) -> bool {
        let task = {
            let mut core = self.shared.core.lock();
            if core.cancelled || !core.state.can_pause() {
                return false;
            }
            core.state = CountdownState::Pause;
            core.generation += 1;
            core.task.take()
        };
        if let Some(task) = task {
            task.cancel();
        }
        true
    }

    /// Continue a paused countdown from the remembered value.
    pub fn resume(&self) -> bool {
        let handle = {
            let mut core = self.shared.core.lock();
            if core.cancelled || core.state != CountdownState::Pause {
                return false;
            }
            let from = core.remaining;
            if from <= self.shared.end {
                warn!(remaining = from, end = self.shared.end, "countdown already completed");
                return false;
            }
            self.launch(&mut core, from)
        };
        handle.start()
    }

    /// Stop the countdown for good and drop its callbacks. Idempotent.
    pub fn cancel(&self) -> bool {
        let (task, callbacks) = {
            let mut core = self.shared.core.lock();
            if core.cancelled {
                return false;
            }
            core.cancelled = true;
            core.generation += 1;
            (core.task.take(), std::mem::take(&mut core.callbacks))
        };
        drop(callbacks);
        if let Some(task) = task {
            task.cancel();
        }
        debug!("countdown cancelled");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecyclablePoolConfig;
    use crate::scheduler::RecyclablePool;
    use crossbeam_channel::unbounded;

    fn fast(from: i64, to: i64) -> CountdownTimer {
        let pool: Arc<dyn Dispatcher> =
            Arc::new(RecyclablePool::new(RecyclablePoolConfig::new("countdown").with_core_threads(1)));
        CountdownBuilder::new()
            .from(from)
            .to(to)
            .interval(2)
            .dispatch_on(pool)
            .create()
            .unwrap()
    }

    #[test]
    fn test_ticks_down_to_end_and_completes() {
        let timer = fast(3, 0);
        let (tx, rx) = unbounded();
        let start_tx = tx.clone();
        let done_tx = tx.clone();
        timer
            .watch_start(move || start_tx.send("start".to_owned()).unwrap())
            .watch_count_down(move |v| tx.send(v.to_string()).unwrap())
            .watch_complete(move || done_tx.send("done".to_owned()).unwrap());
        assert!(timer.start());

        let events: Vec<String> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(events, ["start", "2", "1", "0", "done"]);
        assert_eq!(timer.state(), CountdownState::Complete);
        assert_eq!(timer.remaining(), 0);
    }

    #[test]
    fn test_pause_before_start_still_announces_start() {
        let timer = fast(3, 0);
        let (tx, rx) = unbounded();
        let start_tx = tx.clone();
        timer
            .watch_start(move || start_tx.send("start".to_owned()).unwrap())
            .watch_count_down(move |v| tx.send(v.to_string()).unwrap());
        assert!(timer.pause());
        assert_eq!(timer.state(), CountdownState::Pause);
        assert!(timer.resume());

        let events: Vec<String> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(events, ["start", "2", "1", "0"]);
    }

    #[test]
    fn test_start_at_end_is_noop() {
        let timer = fast(4, 4);
        assert!(!timer.start());
        assert_eq!(timer.state(), CountdownState::Initial);
    }

    #[test]
    fn test_cancel_is_idempotent_and_final() {
        let timer = fast(100, 0);
        assert!(timer.start());
        assert!(timer.cancel());
        assert!(!timer.cancel());
        assert!(!timer.resume());
        assert!(!timer.start());
        assert!(timer.is_cancelled());
    }
}
