use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static CLOCK: AtomicU64 = AtomicU64::new(0);

/// Point on the process-wide modification clock.
///
/// Every call to [`TimeStamp::now`] returns a strictly larger value than the
/// previous one, so comparing stamps orders events across all algorithms.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TimeStamp(u64);

impl TimeStamp {
    /// The stamp of something that never happened.
    pub const NEVER: TimeStamp = TimeStamp(0);

    pub fn now() -> TimeStamp {
        TimeStamp(CLOCK.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Stamp `self` with the current time.
    pub fn modified(&mut self) {
        *self = TimeStamp::now();
    }

    pub fn reset(&mut self) {
        *self = TimeStamp::NEVER;
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_never(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
