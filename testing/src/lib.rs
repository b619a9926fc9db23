//! # TutorHub Testing
//!
//! Helpers for exercising reducers without any I/O:
//!
//! - [`FixedClock`] / [`test_clock`] for deterministic timestamps
//! - [`ReducerTest`], a Given-When-Then harness
//! - [`assertions`] over returned effects
//! - [`init_test_tracing`] to see `tracing` output while debugging a test
//!
//! ```ignore
//! use tutorhub_testing::{ReducerTest, test_clock};
//!
//! ReducerTest::new(BookingReducer::new())
//!     .with_env(BookingEnvironment::new(Arc::new(test_clock()), notifier))
//!     .given_state(BookingState::with_booking(pending_booking()))
//!     .when_action(BookingAction::AdminFix { actor: admin() })
//!     .then_state(|state| assert!(state.last_error.is_some()))
//!     .run();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;
use tutorhub_core::environment::Clock;


pub use reducer_test::{ReducerTest, assertions};

/// Mock environment implementations.
pub mod mocks {
    use super::{Clock, DateTime, Duration, Mutex, Utc};

    /// A clock that always reports the same instant.
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Pin the clock at `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// A clock tests can move forward explicitly.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Start the clock at `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward by `by`.
        pub fn advance(&self, by: Duration) {
            if let Ok(mut time) = self.time.lock() {
                *time += by;
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
                .lock()
                .map_or_else(|poisoned| *poisoned.into_inner(), |time| *time)
        }
    }

    /// 2025-01-01T00:00:00Z, the default instant for tests.
    #[must_use]
    pub fn test_instant() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// A [`FixedClock`] pinned at [`test_instant`].
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_instant())
    }
}

pub use mocks::{FixedClock, ManualClock, test_clock, test_instant};

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from many tests; only the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_never_moves() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn manual_clock_advances_on_request() {
        let clock = ManualClock::new(test_instant());
        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), test_instant() + Duration::minutes(5));
    }
}
