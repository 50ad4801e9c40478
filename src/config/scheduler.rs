//! Pool and runtime configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default core thread count for recyclable pools.
pub const DEFAULT_CORE_THREADS: usize = 8;
/// Default idle keep-alive for recyclable pool workers, in seconds.
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;

const ENV_CORE_THREADS: &str = "LIFECYCLE_SCHEDULER_CORE_THREADS";
const ENV_KEEP_ALIVE_SECS: &str = "LIFECYCLE_SCHEDULER_KEEP_ALIVE_SECS";
const ENV_IO_PARALLELISM: &str = "LIFECYCLE_SCHEDULER_IO_PARALLELISM";
const ENV_DEBUG: &str = "LIFECYCLE_SCHEDULER_DEBUG";

/// Recyclable pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecyclablePoolConfig {
    /// Worker name prefix; threads are named `<name>#<n>`.
    pub name: String,
    /// Number of workers kept while there is work.
    pub core_threads: usize,
    /// Idle time after which a worker exits, in seconds.
    pub keep_alive_secs: u64,
    /// Optional idle time in milliseconds; overrides `keep_alive_secs`.
    #[serde(default)]
    pub keep_alive_ms: Option<u64>,
}

impl RecyclablePoolConfig {
    /// Configuration with defaults and the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            core_threads: DEFAULT_CORE_THREADS,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            keep_alive_ms: None,
        }
    }

    /// Set the core thread count.
    #[must_use]
    pub const fn with_core_threads(mut self, core_threads: usize) -> Self {
        self.core_threads = core_threads;
        self
    }

    /// Set the idle keep-alive.
    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive_secs = keep_alive.as_secs();
        self.keep_alive_ms = Some(u64::try_from(keep_alive.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Effective keep-alive duration.
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        self.keep_alive_ms
            .map_or_else(|| Duration::from_secs(self.keep_alive_secs), Duration::from_millis)
    }

    /// Validate pool configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("name must not be empty".into());
        }
        if self.core_threads == 0 {
            return Err(format!(
                "Expected at least one thread, but {} specified",
                self.core_threads
            ));
        }
        if self.keep_alive().is_zero() {
            return Err("keep_alive must be greater than 0".into());
        }
        Ok(())
    }
}

/// Work-stealing pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkStealingConfig {
    /// Worker name prefix; threads are named `<name>-<index>`.
    pub name: String,
    /// Fixed worker count; `None` means `max(cpus - 1, 1)`.
    #[serde(default)]
    pub parallelism: Option<usize>,
}

impl WorkStealingConfig {
    /// Configuration with default parallelism and the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parallelism: None,
        }
    }

    /// Pin the worker count.
    #[must_use]
    pub const fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    /// Worker count actually used.
    #[must_use]
    pub fn resolved_parallelism(&self) -> usize {
        self.parallelism
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1).max(1))
    }

    /// Validate pool configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("name must not be empty".into());
        }
        if self.parallelism == Some(0) {
            return Err("parallelism must be greater than 0".into());
        }
        Ok(())
    }
}

/// Root configuration for the process-wide schedulers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Pool running promise work.
    pub promise: RecyclablePoolConfig,
    /// Pool producing flow items.
    pub flow: RecyclablePoolConfig,
    /// Work-stealing pool for IO/CPU fan-out.
    pub io: WorkStealingConfig,
    /// Name of the callback delivery thread.
    pub main_thread_name: String,
    /// Verbose task logging.
    #[serde(default)]
    pub debug: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            promise: RecyclablePoolConfig::new("promise"),
            flow: RecyclablePoolConfig::new("flow"),
            io: WorkStealingConfig::new("io"),
            main_thread_name: "main".into(),
            debug: false,
        }
    }
}

impl RuntimeConfig {
    /// Enable verbose task logging.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Validate all pools.
    pub fn validate(&self) -> Result<(), String> {
        self.promise
            .validate()
            .map_err(|e| format!("pool `promise` invalid: {e}"))?;
        self.flow
            .validate()
            .map_err(|e| format!("pool `flow` invalid: {e}"))?;
        self.io
            .validate()
            .map_err(|e| format!("pool `io` invalid: {e}"))?;
        if self.main_thread_name.is_empty() {
            return Err("main_thread_name must not be empty".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by environment variables (a `.env` file is loaded
    /// first when present).
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Some(core) = env_parse::<usize>(ENV_CORE_THREADS)? {
            cfg.promise.core_threads = core;
            cfg.flow.core_threads = core;
        }
        if let Some(secs) = env_parse::<u64>(ENV_KEEP_ALIVE_SECS)? {
            cfg.promise.keep_alive_secs = secs;
            cfg.flow.keep_alive_secs = secs;
        }
        if let Some(parallelism) = env_parse::<usize>(ENV_IO_PARALLELISM)? {
            cfg.io.parallelism = Some(parallelism);
        }
        if let Some(debug) = env_parse::<bool>(ENV_DEBUG)? {
            cfg.debug = debug;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, String>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| format!("{key}: {e}")),
        Err(_) => Ok(None),
    }
}
