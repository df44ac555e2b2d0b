//! Data types exchanged with the LocalLink marketplace API.
//!
//! Everything here is plain data plus field validation; session and booking
//! workflows live in the `service` crate.

pub mod booking;
pub mod errors;
pub mod user;

pub use booking::{Booking, BookingId, BookingStatus, CreateBooking, NewBooking, ServiceSummary, StatusUpdate};
pub use errors::ModelError;
pub use user::{ProfileUpdate, Role, SignupRole, User, UserId};
