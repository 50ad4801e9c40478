use std::sync::Arc;

use crate::core::error::ValidationError;
use crate::scheduler::Dispatcher;

use super::state::TimeUnit;
use super::CountdownTimer;

const DEFAULT_INTERVAL_MS: i64 = 1000;

/// Validated construction of a [`CountdownTimer`].
///
/// ```no_run
/// use lifecycle_scheduler::countdown::{CountdownBuilder, TimeUnit};
///
/// let timer = CountdownBuilder::new()
///     .from(10)
///     .to(0)
///     .with_unit(TimeUnit::Seconds)
///     .interval(1000)
///     .create()
///     .unwrap();
/// timer.watch_count_down(|remaining| println!("{remaining}"));
/// timer.start();
/// ```
#[derive(Clone)]
pub struct CountdownBuilder {
    start: i64,
    end: i64,
    unit: TimeUnit,
    interval_ms: i64,
    dispatcher: Option<Arc<dyn Dispatcher>>,
}

impl Default for CountdownBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CountdownBuilder {
    /// Builder counting from 0 to 0 in seconds, one tick per 1000 ms.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            start: 0,
            end: 0,
            unit: TimeUnit::Seconds,
            interval_ms: DEFAULT_INTERVAL_MS,
            dispatcher: None,
        }
    }

    /// Start value.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub const fn from(mut self, start: i64) -> Self {
        self.start = start;
        self
    }

    /// End value.
    #[must_use]
    pub const fn to(mut self, end: i64) -> Self {
        self.end = end;
        self
    }

    /// Unit of the values; the interval is multiplied by its factor.
    #[must_use]
    pub const fn with_unit(mut self, unit: TimeUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Milliseconds between ticks, before unit scaling.
    #[must_use]
    pub const fn interval(mut self, interval_ms: i64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    /// Run the driving task and callbacks on `dispatcher` instead of the main
    /// scheduler.
    #[must_use]
    pub fn dispatch_on(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// [`ValidationError::StartBelowEnd`] when `start < end`,
    /// [`ValidationError::NegativeInterval`] when the interval is negative.
    pub fn create(self) -> Result<CountdownTimer, ValidationError> {
        if self.start < self.end {
            return Err(ValidationError::StartBelowEnd {
                start: self.start,
                end: self.end,
            });
        }
        let interval_ms =
            u64::try_from(self.interval_ms).map_err(|_| ValidationError::NegativeInterval(self.interval_ms))?;
        Ok(CountdownTimer::new(
            self.start,
            self.end,
            self.unit,
            interval_ms,
            self.dispatcher,
        ))
    }
}
