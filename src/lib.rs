//! # Lifecycle Scheduler
//!
//! Lifecycle-scoped task scheduling on dedicated thread pools.
//!
//! Work is launched on one of a few process-wide dispatchers and bound to an
//! owner: when the owner tears down, every task it guards is cancelled. On top
//! of that sit promise chains, timers, a pausable countdown and fan-out with
//! positional error reporting.
//!
//! ## Core Problem Solved
//!
//! UI-style applications launch background work from short-lived screens:
//!
//! - **Leaked work**: a request still running after its screen is gone wastes
//!   threads and delivers results nobody can show
//! - **Leaked listeners**: long-lived owners accumulate cancellation observers
//!   for tasks that finished long ago
//! - **Thread affinity**: results must be handed back on the main thread
//!
//! ## Key Features
//!
//! - **Recyclable pool**: core-sized worker pool whose idle threads exit after
//!   a keep-alive, created lazily exactly once
//! - **Work-stealing pool**: per-worker deques for IO/CPU fan-out
//! - **Lifecycle bridge**: `bind`, `bind_auto_unbind`, view attachment
//! - **Promises**: lazy work on the promise pool, `then`/`catch` on main
//! - **Timers**: `after`/`every` with one handle per timer
//! - **Countdown**: start, pause, resume and cancel at unit granularity
//! - **Fan-out**: results and failures reported by input position
//!
//! ## Promise chains
//!
//! ```rust,no_run
//! use lifecycle_scheduler::lifecycle::{Lifecycle, LifecycleEvent};
//! use lifecycle_scheduler::promise::promise;
//!
//! let screen = Lifecycle::new("detail-screen");
//! let _chain = promise(&screen, async { Ok::<_, anyhow::Error>(42) })?
//!     .then(|value| println!("got {value} on the main thread"))
//!     .catch(|err| eprintln!("request failed: {err}"));
//!
//! // Destroying the owner cancels whatever is still running.
//! screen.handle_event(LifecycleEvent::Destroy);
//! # Ok::<(), lifecycle_scheduler::core::BindError>(())
//! ```
//!
//! ## Configuration
//!
//! The registry is built from the environment on first use
//! (`LIFECYCLE_SCHEDULER_CORE_THREADS`, `LIFECYCLE_SCHEDULER_KEEP_ALIVE_SECS`,
//! `LIFECYCLE_SCHEDULER_IO_PARALLELISM`, `LIFECYCLE_SCHEDULER_DEBUG`), or
//! installed explicitly:
//!
//! ```rust,no_run
//! use lifecycle_scheduler::config::RuntimeConfig;
//! use lifecycle_scheduler::scheduler::Schedulers;
//!
//! Schedulers::install(RuntimeConfig::default().with_debug(true))?;
//! # Ok::<(), lifecycle_scheduler::core::SchedulerError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Task handles, scopes, errors and the future runner.
pub mod core;
/// Configuration models for pools and the process-wide registry.
pub mod config;
/// Builders to construct schedulers from configuration.
pub mod builders;
/// Dispatchers: recyclable pool, work-stealing pool, main thread.
pub mod scheduler;
/// Owner lifecycles, views and the cancellation bridge.
pub mod lifecycle;
/// Promise/then/catch chains.
pub mod promise;
/// One-shot and repeating timers.
pub mod timer;
/// Pausable countdown.
pub mod countdown;
/// Fan-out with positional result and error aggregation.
pub mod fanout;
/// Lifecycle-bound stream collection.
pub mod flow;
/// Runtime adapters: tokio timer driver and tokio dispatcher.
pub mod runtime;
/// Shared utilities.
pub mod util;
