//! Checkpoint throttling

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of monotonic time for a session
///
/// Sessions read time through this trait so tests can drive the checkpoint
/// throttle without sleeping.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant
    fn now(&self) -> Instant;
}

/// Wall-clock [`Clock`] backed by [`Instant::now`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Rate limiter deciding when a session persists its progress
///
/// The first call to [`should_update`](Self::should_update) always passes.
/// Later calls pass only once `interval` has elapsed since the last passing
/// call. Each session owns its own throttle, so concurrent sessions throttle
/// independently.
#[derive(Debug)]
pub struct CheckpointThrottle {
    clock: Arc<dyn Clock>,
    interval: Duration,
    last: Option<Instant>,
}

impl CheckpointThrottle {
    /// Create a throttle with the given minimum interval
    pub fn new(clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            clock,
            interval,
            last: None,
        }
    }

    /// Whether a checkpoint is due; records the time when it is
    pub fn should_update(&mut self) -> bool {
        let now = self.clock.now();
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Instant of the last passing call
    pub fn last_checkpoint(&self) -> Option<Instant> {
        self.last
    }
}

/// Test clock that only moves when told to
///
/// `step` is added after every reading, which lets a test make every
/// iteration of a transfer loop look `step` apart.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct ManualClock {
    base: Instant,
    offset: std::sync::Mutex<Duration>,
    step: Duration,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new() -> Self {
        Self::stepping(Duration::ZERO)
    }

    pub(crate) fn stepping(step: Duration) -> Self {
        Self {
            base: Instant::now(),
            offset: std::sync::Mutex::new(Duration::ZERO),
            step,
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        let mut offset = self
            .offset
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *offset += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let mut offset = self
            .offset
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = self.base + *offset;
        *offset += self.step;
        now
    }
}
