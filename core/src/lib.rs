//! # TutorHub Core
//!
//! The functional core shared by every TutorHub service.
//!
//! Business rules live in reducers: pure functions that take the current
//! state of an aggregate (a booking, for instance), an action describing what
//! was requested or what happened, and an environment of injected
//! dependencies. A reducer mutates the state in place and hands back a list
//! of [`Effect`](effect::Effect) values describing the I/O it wants done.
//! The imperative shell (HTTP handlers, services) decides when those effects
//! run, which keeps the rules themselves deterministic and cheap to test.
//!
//! ```ignore
//! impl Reducer for BookingReducer {
//!     type State = BookingState;
//!     type Action = BookingAction;
//!     type Environment = BookingEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut BookingState,
//!         action: BookingAction,
//!         env: &BookingEnvironment,
//!     ) -> SmallVec<[Effect<BookingAction>; 4]> {
//!         // validate, apply events, describe notifications
//!         SmallVec::new()
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// The [`Reducer`](reducer::Reducer) trait.
pub mod reducer {
    use super::SmallVec;
    use super::effect::Effect;

    /// Business logic for one aggregate.
    ///
    /// `reduce` must not perform I/O. Anything that talks to the outside
    /// world is returned as an [`Effect`] for the caller to execute.
    pub trait Reducer {
        /// Aggregate state the reducer operates on.
        type State;

        /// Commands and events the reducer understands.
        type Action;

        /// Injected dependencies (clock, collaborators).
        type Environment;

        /// Apply `action` to `state` and describe the resulting side effects.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Side effect descriptions returned by reducers.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// A side effect to be executed after the reducer has returned.
    ///
    /// Effects are values. Building one does nothing; the shell that owns
    /// the reducer executes them once the new state has been persisted.
    pub enum Effect<Action> {
        /// Nothing to do.
        None,

        /// Effects that may run concurrently.
        Parallel(Vec<Effect<Action>>),

        /// Effects that must run in order.
        Sequential(Vec<Effect<Action>>),

        /// Feed `action` back after `duration`.
        Delay {
            /// How long to wait.
            duration: Duration,
            /// Action to dispatch once the delay elapses.
            action: Box<Action>,
        },

        /// Arbitrary async work. A returned action is fed back to the reducer.
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::None => write!(f, "Effect::None"),
                Self::Parallel(effects) => f.debug_tuple("Effect::Parallel").field(effects).finish(),
                Self::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Self::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Self::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Run `effects` concurrently.
        #[must_use]
        pub const fn merge(effects: Vec<Self>) -> Self {
            Self::Parallel(effects)
        }

        /// Run `effects` one after another.
        #[must_use]
        pub const fn chain(effects: Vec<Self>) -> Self {
            Self::Sequential(effects)
        }

        /// Wrap a fire-and-forget future that feeds nothing back.
        #[must_use]
        pub fn fire_and_forget<F>(future: F) -> Self
        where
            F: Future<Output = ()> + Send + 'static,
        {
            Self::Future(Box::pin(async move {
                future.await;
                None
            }))
        }

        /// `true` when this effect does no work at all.
        #[must_use]
        pub fn is_none(&self) -> bool {
            match self {
                Self::None => true,
                Self::Parallel(effects) | Self::Sequential(effects) => {
                    effects.iter().all(Self::is_none)
                },
                Self::Delay { .. } | Self::Future(_) => false,
            }
        }
    }
}

/// Dependency traits injected through a reducer's environment.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Source of the current time.
    ///
    /// Reducers never call `Utc::now()` directly so tests can pin time.
    pub trait Clock: Send + Sync {
        /// Current instant.
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
