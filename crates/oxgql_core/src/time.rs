//! Injectable time source for request timing.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// A monotonic time source.
///
/// The executor takes a clock at construction; transports and extensions
/// read timestamps through it. Tests substitute a deterministic clock.
pub trait Clock: Send + Sync + 'static {
    /// Timestamp on the clock's own monotonic scale.
    fn now(&self) -> Duration;
}

/// The shared clock handle threaded through the executor.
pub type SharedClock = Arc<dyn Clock>;

/// Real monotonic clock anchored at its own creation.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// A span measured on the executor clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceTiming {
    pub start: Duration,
    pub end: Duration,
}

impl TraceTiming {
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}
