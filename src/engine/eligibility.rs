use crate::model::*;

/// A user may comment on an item once one of their bookings *of that item* has ended.
///
/// `bookings` may contain bookings of other items or other users; only
/// `user_id`'s bookings of `item_id` count. Booking status is not consulted.
pub fn can_comment(user_id: Id, item_id: Id, bookings: &[Booking], now: Ms) -> bool {
    bookings
        .iter()
        .any(|b| b.booker_id == user_id && b.item_id == item_id && b.span.ended_before(now))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: Ms = 50_000;

    fn booking(item_id: Id, booker_id: Id, start: Ms, end: Ms) -> Booking {
        Booking {
            id: item_id * 100 + booker_id,
            item_id,
            booker_id,
            span: Span::new(start, end),
            status: BookingStatus::Approved,
        }
    }

    #[test]
    fn finished_booking_of_this_item_qualifies() {
        let bookings = vec![booking(1, 7, NOW - 200, NOW - 100)];
        assert!(can_comment(7, 1, &bookings, NOW));
    }

    #[test]
    fn finished_booking_of_another_item_does_not() {
        let bookings = vec![booking(2, 7, NOW - 200, NOW - 100)];
        assert!(!can_comment(7, 1, &bookings, NOW));
    }

    #[test]
    fn someone_elses_booking_does_not() {
        let bookings = vec![booking(1, 8, NOW - 200, NOW - 100)];
        assert!(!can_comment(7, 1, &bookings, NOW));
    }

    #[test]
    fn ongoing_or_just_ending_booking_does_not() {
        let ongoing = vec![booking(1, 7, NOW - 200, NOW + 100)];
        assert!(!can_comment(7, 1, &ongoing, NOW));
        let ends_now = vec![booking(1, 7, NOW - 200, NOW)];
        assert!(!can_comment(7, 1, &ends_now, NOW));
        assert!(can_comment(7, 1, &ends_now, NOW + 1));
    }
}
