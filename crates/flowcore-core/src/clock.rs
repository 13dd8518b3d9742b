//! # Clock
//!
//! Time is injected, never read ambiently, so stores and chains stay
//! reproducible under test. One clock instance is shared by the store, the
//! chain and the facade.

use crate::Timestamp;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of `Timestamp`s.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        // A clock set before 1970 reads as the epoch rather than failing.
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Timestamp(millis)
    }
}

/// Deterministic clock for tests and reproducible scenario runs.
///
/// Every read returns the current value and then advances it by `step`.
/// A step of 0 freezes the clock.
#[derive(Debug)]
pub struct ManualClock {
    current: AtomicU64,
    step: u64,
}

impl ManualClock {
    /// A clock that always reads `at`.
    #[must_use]
    pub fn frozen(at: Timestamp) -> Self {
        Self::ticking(at, 0)
    }

    /// A clock starting at `start` that advances by `step` on every read.
    #[must_use]
    pub fn ticking(start: Timestamp, step: u64) -> Self {
        Self {
            current: AtomicU64::new(start.millis()),
            step,
        }
    }

    /// Move the clock to an absolute time.
    pub fn set(&self, at: Timestamp) {
        self.current.store(at.millis(), Ordering::SeqCst);
    }

    /// Read without advancing.
    #[must_use]
    pub fn peek(&self) -> Timestamp {
        Timestamp(self.current.load(Ordering::SeqCst))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        let step = self.step;
        let previous = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                Some(t.saturating_add(step))
            })
            .unwrap_or_else(|t| t);
        Timestamp(previous)
    }
}
