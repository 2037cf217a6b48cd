//! Clock abstraction for the refresh debounce.
//!
//! The scheduler never reads the system clock directly. Production code uses
//! [`RealTimeSource`]; tests drive a [`TestTimeSource`] forward by hand so
//! debounce windows expire deterministically and instantly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait TimeSource: Send + Sync + std::fmt::Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;

    /// Block for `duration`. Virtual clocks advance instead of sleeping.
    fn sleep(&self, duration: Duration);

    fn elapsed_since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }

    /// Time left until `deadline`, zero if it has passed.
    fn remaining_until(&self, deadline: Instant) -> Duration {
        deadline.saturating_duration_since(self.now())
    }
}

/// Type alias for shared time source.
pub type SharedTimeSource = Arc<dyn TimeSource>;

/// System clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTimeSource;

impl RealTimeSource {
    pub fn new() -> Self {
        Self
    }

    pub fn shared() -> SharedTimeSource {
        Arc::new(Self)
    }
}

impl TimeSource for RealTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock that only moves when told to.
///
/// # Example
///
/// ```
/// use workbench::services::time_source::{TestTimeSource, TimeSource};
/// use std::time::Duration;
///
/// let clock = TestTimeSource::new();
/// let deadline = clock.now() + Duration::from_millis(250);
///
/// clock.advance(Duration::from_millis(100));
/// assert_eq!(clock.remaining_until(deadline), Duration::from_millis(150));
/// ```
#[derive(Debug)]
pub struct TestTimeSource {
    /// Logical time in nanoseconds since creation.
    logical_nanos: AtomicU64,
    base_instant: Instant,
}

impl Default for TestTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TestTimeSource {
    pub fn new() -> Self {
        Self {
            logical_nanos: AtomicU64::new(0),
            base_instant: Instant::now(),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn advance(&self, duration: Duration) {
        self.logical_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Logical time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.logical_nanos.load(Ordering::SeqCst))
    }
}

impl TimeSource for TestTimeSource {
    fn now(&self) -> Instant {
        self.base_instant + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
