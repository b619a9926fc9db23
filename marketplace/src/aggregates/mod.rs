//! Aggregates (reducers) of the marketplace.

pub mod booking;

pub use booking::{
    BookingAction, BookingEnvironment, BookingReducer, BookingState, TransitionRule,
    participant_transition,
};
