//! Environment abstraction for deterministic testing.
//!
//! Decouples session logic from the system clock. Production uses
//! `std::time::Instant`; tests use [`test_utils::MockEnv`], whose clock only
//! moves when the test advances it.

use std::time::Duration;

/// Abstract environment providing monotonic time.
///
/// Implementations MUST guarantee that `now()` never goes backwards within a
/// single execution context; the session derives poll schedules, cooldown
/// remainders, and delayed transitions from differences between instants.
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;
}

/// Test environments with a manually advanced clock.
pub mod test_utils {
    use std::{
        sync::{Arc, Mutex},
        time::{Duration, Instant},
    };

    use super::Environment;

    /// Deterministic environment whose clock advances only on demand.
    ///
    /// Clones share the same clock, so a driver and the test body observe
    /// identical time.
    #[derive(Clone)]
    pub struct MockEnv {
        start: Instant,
        offset: Arc<Mutex<Duration>>,
    }

    impl MockEnv {
        /// Create a mock environment frozen at an arbitrary origin.
        pub fn new() -> Self {
            Self { start: Instant::now(), offset: Arc::new(Mutex::new(Duration::ZERO)) }
        }

        /// Advance the clock by `delta`.
        pub fn advance(&self, delta: Duration) {
            let mut offset = self.offset.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *offset += delta;
        }
    }

    impl Default for MockEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Environment for MockEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            let offset =
                *self.offset.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            self.start + offset
        }
    }

}
