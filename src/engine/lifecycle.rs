use std::cmp::Reverse;

use crate::model::*;

use super::EngineError;

/// Status a booking moves to when its owner decides on it.
///
/// Only `WAITING` bookings can be decided; a decided booking never changes again,
/// whichever way the new decision goes.
pub fn decide(booking: &Booking, approved: bool) -> Result<BookingStatus, EngineError> {
    if booking.status.is_decided() {
        return Err(EngineError::BookingAlreadyDecided {
            id: booking.id,
            status: booking.status,
        });
    }
    Ok(if approved {
        BookingStatus::Approved
    } else {
        BookingStatus::Rejected
    })
}

/// Apply a state filter against one captured instant and order the result
/// by start, latest first (ties: higher id first).
pub fn select_bookings<'a>(
    bookings: impl IntoIterator<Item = &'a Booking>,
    state: BookingState,
    now: Ms,
) -> Vec<Booking> {
    let mut selected: Vec<Booking> = bookings
        .into_iter()
        .filter(|b| state.matches(b, now))
        .cloned()
        .collect();
    selected.sort_by_key(|b| Reverse((b.span.start, b.id)));
    selected
}
