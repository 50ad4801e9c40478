//! Process-wide scheduler registry.

use std::sync::{Arc, OnceLock};

use tracing::warn;

use crate::builders::build_schedulers;
use crate::config::RuntimeConfig;
use crate::core::error::SchedulerError;

use super::{Dispatcher, MainThread, RecyclablePool, WorkStealingPool};

static GLOBAL: OnceLock<Schedulers> = OnceLock::new();

/// The schedulers used by promises, flows, timers and fan-out.
pub struct Schedulers {
    config: RuntimeConfig,
    promise: Arc<RecyclablePool>,
    flow: Arc<RecyclablePool>,
    io: Arc<WorkStealingPool>,
    main: Arc<MainThread>,
}

impl Schedulers {
    /// Build a registry from configuration. Pools start lazily.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] if validation fails.
    pub fn new(config: RuntimeConfig) -> Result<Self, SchedulerError> {
        build_schedulers(&config)
    }

    pub(crate) fn from_parts(
        config: RuntimeConfig,
        promise: RecyclablePool,
        flow: RecyclablePool,
        io: WorkStealingPool,
        main: MainThread,
    ) -> Self {
        Self {
            config,
            promise: Arc::new(promise),
            flow: Arc::new(flow),
            io: Arc::new(io),
            main: Arc::new(main),
        }
    }

    /// Install the process-wide registry.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or a registry is already in use.
    pub fn install(config: RuntimeConfig) -> Result<&'static Self, SchedulerError> {
        let schedulers = Self::new(config)?;
        GLOBAL
            .set(schedulers)
            .map_err(|_| SchedulerError::AlreadyInstalled)?;
        Ok(Self::global())
    }

    /// The process-wide registry, built from the environment on first use.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(|| {
            let config = RuntimeConfig::from_env().unwrap_or_else(|err| {
                warn!(error = %err, "invalid scheduler environment, using defaults");
                RuntimeConfig::default()
            });
            Self::new(config).unwrap_or_else(|err| {
                warn!(error = %err, "falling back to default scheduler configuration");
                let fallback = RuntimeConfig::default();
                Self::from_parts(
                    fallback.clone(),
                    RecyclablePool::new(fallback.promise),
                    RecyclablePool::new(fallback.flow),
                    WorkStealingPool::new(fallback.io),
                    MainThread::new(fallback.main_thread_name),
                )
            })
        })
    }

    /// Configuration the registry was built from.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Dispatcher for promise work.
    #[must_use]
    pub fn promise(&self) -> Arc<dyn Dispatcher> {
        Arc::clone(&self.promise) as Arc<dyn Dispatcher>
    }

    /// Dispatcher producing flow items.
    #[must_use]
    pub fn flow(&self) -> Arc<dyn Dispatcher> {
        Arc::clone(&self.flow) as Arc<dyn Dispatcher>
    }

    /// Work-stealing dispatcher for IO/CPU fan-out.
    #[must_use]
    pub fn io(&self) -> Arc<dyn Dispatcher> {
        Arc::clone(&self.io) as Arc<dyn Dispatcher>
    }

    /// Callback delivery dispatcher.
    #[must_use]
    pub fn main(&self) -> Arc<dyn Dispatcher> {
        self.main.dispatcher()
    }

    /// The main thread itself, for `run_or_post` and `flush`.
    #[must_use]
    pub const fn main_thread(&self) -> &Arc<MainThread> {
        &self.main
    }

    /// The promise pool, for inspection.
    #[must_use]
    pub const fn promise_pool(&self) -> &Arc<RecyclablePool> {
        &self.promise
    }

    /// The io pool, for inspection.
    #[must_use]
    pub const fn io_pool(&self) -> &Arc<WorkStealingPool> {
        &self.io
    }

    /// Close every scheduler in the registry.
    pub fn close_all(&self) {
        self.promise.close();
        self.flow.close();
        self.io.close();
        self.main.close();
    }
}
