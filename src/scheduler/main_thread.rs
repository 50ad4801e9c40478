//! Single-threaded dispatcher standing in for a UI/main thread.

use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::error::Rejected;

use super::{run_job, Dispatcher, Job, LazySlot};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

enum Message {
    Run(Job),
    Shutdown,
}

struct Looper {
    tx: Sender<Message>,
    thread_id: ThreadId,
}

impl Looper {
    fn start(name: &str) -> Result<Self, Rejected> {
        let (tx, rx) = unbounded::<Message>();
        let loop_name = name.to_owned();
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || looper(&loop_name, &rx))
            .map_err(|err| Rejected::spawn_failed(name, &err))?;
        Ok(Self {
            tx,
            thread_id: handle.thread().id(),
        })
    }
}

fn looper(name: &str, rx: &Receiver<Message>) {
    debug!(scheduler = name, "main looper started");
    while let Ok(Message::Run(job)) = rx.recv() {
        run_job(name, job);
    }
    debug!(scheduler = name, "main looper stopped");
}

/// Serial dispatcher: all jobs run in submission order on one named thread.
///
/// Continuations, error handlers and lifecycle registrations are delivered
/// here. Every job accepted before [`Dispatcher::close`] runs before the
/// looper stops.
pub struct MainThread {
    name: String,
    looper: LazySlot<Looper>,
    // held while sending, so no job can be queued behind Shutdown
    closed: Mutex<bool>,
}

impl MainThread {
    /// Create a dispatcher whose thread starts on first use.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            looper: LazySlot::new(),
            closed: Mutex::new(false),
        }
    }

    /// Whether the caller runs on this dispatcher's thread.
    pub fn is_current(&self) -> bool {
        self.looper
            .get()
            .is_some_and(|looper| looper.thread_id == thread::current().id())
    }

    /// Run `job` inline when already on this thread, post it otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Rejected`] when the dispatcher is closed.
    pub fn run_or_post(&self, job: impl FnOnce() + Send + 'static) -> Result<(), Rejected> {
        if self.is_current() {
            job();
            Ok(())
        } else {
            self.execute(Box::new(job))
        }
    }

    /// Block until every job posted before this call has run.
    ///
    /// Returns `false` on timeout or when the dispatcher is closed.
    pub fn flush(&self) -> bool {
        if self.is_current() {
            return true;
        }
        let (tx, rx) = bounded(1);
        if self
            .execute(Box::new(move || {
                let _ = tx.send(());
            }))
            .is_err()
        {
            return false;
        }
        rx.recv_timeout(FLUSH_TIMEOUT).is_ok()
    }

    /// Shared handle as a trait object.
    pub fn dispatcher(self: &Arc<Self>) -> Arc<dyn Dispatcher> {
        Arc::clone(self) as Arc<dyn Dispatcher>
    }
}

impl Dispatcher for MainThread {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, job: Job) -> Result<(), Rejected> {
        let closed = self.closed.lock();
        if *closed {
            return Err(Rejected::shutdown(&self.name));
        }
        let looper = self.looper.get_or_try_init(|| Looper::start(&self.name))?;
        looper
            .tx
            .send(Message::Run(job))
            .map_err(|_| Rejected::shutdown(&self.name))
    }

    fn close(&self) {
        let mut closed = self.closed.lock();
        if *closed {
            return;
        }
        *closed = true;
        if let Some(looper) = self.looper.get() {
            if looper.tx.send(Message::Shutdown).is_err() {
                warn!(scheduler = %self.name, "main looper already stopped");
            }
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

impl Drop for MainThread {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[test]
    fn test_jobs_run_in_order_on_one_thread() {
        let main = MainThread::new("ui");
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..50 {
            let seen = Arc::clone(&seen);
            main.execute(Box::new(move || {
                seen.lock().push((i, thread::current().name().map(str::to_owned)));
            }))
            .unwrap();
        }
        assert!(main.flush());
        let seen = seen.lock();
        assert_eq!(seen.iter().map(|(i, _)| *i).collect::<Vec<_>>(), (0..50).collect::<Vec<_>>());
        assert!(seen.iter().all(|(_, name)| name.as_deref() == Some("ui")));
    }

    #[test]
    fn test_run_or_post_inline_on_main() {
        let main = Arc::new(MainThread::new("ui-inline"));
        let (tx, rx) = bounded(1);
        let inner = Arc::clone(&main);
        main.execute(Box::new(move || {
            let ran = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&ran);
            inner.run_or_post(move || flag.store(true, Ordering::SeqCst)).unwrap();
            tx.send(ran.load(Ordering::SeqCst)).unwrap();
        }))
        .unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert!(!main.is_current());
    }

    #[test]
    fn test_every_accepted_job_runs_when_close_races() {
        for round in 0..20 {
            let main = Arc::new(MainThread::new(format!("ui-race-{round}")));
            main.execute(Box::new(|| {})).unwrap();
            let ran = Arc::new(AtomicUsize::new(0));
            let accepted = Arc::new(AtomicUsize::new(0));
            let (done_tx, done_rx) = unbounded::<()>();
            let submitters: Vec<_> = (0..4)
                .map(|_| {
                    let main = Arc::clone(&main);
                    let ran = Arc::clone(&ran);
                    let accepted = Arc::clone(&accepted);
                    let done_tx = done_tx.clone();
                    thread::spawn(move || {
                        for _ in 0..200 {
                            let ran = Arc::clone(&ran);
                            let done_tx = done_tx.clone();
                            let job = Box::new(move || {
                                ran.fetch_add(1, Ordering::SeqCst);
                                let _ = done_tx.send(());
                            });
                            if main.execute(job).is_err() {
                                break;
                            }
                            accepted.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();
            thread::sleep(Duration::from_micros(200));
            main.close();
            for submitter in submitters {
                submitter.join().unwrap();
            }
            drop(done_tx);
            let accepted = accepted.load(Ordering::SeqCst);
            for _ in 0..accepted {
                done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
            }
            assert_eq!(ran.load(Ordering::SeqCst), accepted);
        }
    }

    #[test]
    fn test_closed_main_rejects() {
        let main = MainThread::new("ui-closed");
        main.close();
        assert!(main.execute(Box::new(|| {})).is_err());
        assert!(!main.flush());
    }
}
