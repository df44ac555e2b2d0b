//! Booking lifecycle: the transition table every view consults and the
//! per-dashboard controller that reconciles its cache with the server.

pub mod controller;
pub mod errors;
pub mod state_machine;

pub use controller::{in_scope, BookingListController};
pub use errors::BookingError;
pub use state_machine::{allowed_transitions, can_transition, validate_transition};
