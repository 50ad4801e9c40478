use serde::{Deserialize, Serialize};

/// Unit of countdown values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeUnit {
    /// One value per second.
    #[default]
    Seconds,
    /// One value per minute.
    Minutes,
    /// One value per hour.
    Hours,
}

impl TimeUnit {
    /// Seconds per unit; scales the tick interval.
    #[must_use]
    pub const fn factor(self) -> u64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 60 * 60,
        }
    }
}

/// Where a countdown is in its run.
///
/// ```text
/// Initial -> Resume -> Dispatch -> ... -> Complete
///    |         |          |
///    +---------+----------+--> Pause -> Resume
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountdownState {
    /// Built, not started.
    Initial,
    /// Tick loop entered, waiting for the next tick.
    Resume,
    /// Delivering a tick.
    Dispatch,
    /// Suspended; remembers the last delivered value.
    Pause,
    /// End value reached.
    Complete,
}

impl CountdownState {
    /// States from which `pause` is legal.
    #[must_use]
    pub const fn can_pause(self) -> bool {
        matches!(self, Self::Initial | Self::Resume | Self::Dispatch)
    }

    /// Whether a driving task is active in this state.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Resume | Self::Dispatch)
    }
}
