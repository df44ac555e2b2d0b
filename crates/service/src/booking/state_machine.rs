//! The booking transition table. Every view that renders a status button
//! and every mutation the controller dispatches consults this one table.

use models::{BookingStatus, Role};

use super::errors::BookingError;

use BookingStatus::{Cancelled, Completed, Confirmed, Pending, RescheduleRequested};

const NONE: &[BookingStatus] = &[];

/// Statuses `actor` may move a booking in `current` to.
///
/// Terminal statuses admit nothing, for any role. Admins may move any
/// non-terminal booking to every other status except `pending`.
pub fn allowed_transitions(current: BookingStatus, actor: Role) -> &'static [BookingStatus] {
    if current.is_terminal() {
        return NONE;
    }
    match (actor, current) {
        (Role::Client, RescheduleRequested) => &[Cancelled],
        (Role::Client, _) => &[Cancelled, RescheduleRequested],

        (Role::Provider, Confirmed) => &[Completed, Cancelled],
        (Role::Provider, _) => &[Confirmed, Cancelled],

        (Role::Admin, Pending) => &[Confirmed, Completed, Cancelled, RescheduleRequested],
        (Role::Admin, Confirmed) => &[Completed, Cancelled, RescheduleRequested],
        (Role::Admin, _) => &[Confirmed, Completed, Cancelled],
    }
}

pub fn can_transition(current: BookingStatus, target: BookingStatus, actor: Role) -> bool {
    allowed_transitions(current, actor).contains(&target)
}

pub fn validate_transition(current: BookingStatus, target: BookingStatus, actor: Role) -> Result<(), BookingError> {
    if can_transition(current, target, actor) {
        Ok(())
    } else {
        Err(BookingError::InvalidTransition { from: current, to: target, role: actor })
    }
}
