//! Session Clock
//!
//! Millisecond monotonic clock behind a trait so every analytics component
//! can be driven by virtual time in tests. All timestamps in the engine are
//! `i64` milliseconds from this clock - NEVER call system time directly.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Milliseconds since Unix epoch.
pub type Ms = i64;

pub const MS_PER_SEC: i64 = 1_000;

/// Source of monotonic millisecond timestamps.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_ms(&self) -> Ms;
}

/// Production clock: wall-clock base stamped once at construction, advanced
/// by a monotonic `tokio::time::Instant`. Under a paused tokio runtime this
/// follows virtual time, which keeps the periodic ticks testable.
#[derive(Debug)]
pub struct WallClock {
    base_ms: Ms,
    epoch: tokio::time::Instant,
}

impl WallClock {
    pub fn new() -> Self {
        Self {
            base_ms: chrono::Utc::now().timestamp_millis(),
            epoch: tokio::time::Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    #[inline]
    fn now_ms(&self) -> Ms {
        self.base_ms + self.epoch.elapsed().as_millis() as i64
    }
}

/// Simulated clock for deterministic tests.
///
/// # Determinism Contract
/// - `now_ms()` returns the current simulated time, never system time
/// - `advance_to` only moves forward
#[derive(Debug)]
pub struct SimClock {
    current: AtomicI64,
}

impl SimClock {
    pub fn new(start_ms: Ms) -> Arc<Self> {
        Arc::new(Self {
            current: AtomicI64::new(start_ms),
        })
    }

    pub fn advance_by(&self, delta_ms: Ms) {
        debug_assert!(delta_ms >= 0, "SimClock: delta must be non-negative");
        self.current.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn advance_to(&self, new_ms: Ms) {
        let prev = self.current.swap(new_ms, Ordering::SeqCst);
        debug_assert!(
            new_ms >= prev,
            "SimClock: cannot go backward from {} to {}",
            prev,
            new_ms
        );
    }
}

impl Clock for SimClock {
    #[inline]
    fn now_ms(&self) -> Ms {
        self.current.load(Ordering::SeqCst)
    }
}
