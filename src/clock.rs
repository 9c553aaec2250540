//! Time sources for emission cadence and simulated processing.
//!
//! - [`SystemClock`]: monotonic wall clock, `sleep` blocks the thread
//! - [`VirtualClock`]: logical clock, `sleep` advances time instantly

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A source of time that can also wait
pub trait Clock: Send + Sync + Debug + 'static {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;

    /// Let `duration` of clock time pass
    fn sleep(&self, duration: Duration);
}

/// Monotonic wall clock
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Logical clock for deterministic tests
///
/// Sleeping advances the shared time by the requested amount and returns
/// immediately. Clones observe the same time.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    nanos: Arc<AtomicU64>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward without a sleeper
    pub fn advance(&self, duration: Duration) {
        self.nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
