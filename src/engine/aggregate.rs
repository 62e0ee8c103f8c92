use crate::model::*;

/// Most recent finished booking: among non-rejected bookings with `end < now`,
/// the one with the greatest end (ties: highest id).
pub fn last_booking(bookings: &[Booking], now: Ms) -> Option<&Booking> {
    bookings
        .iter()
        .filter(|b| b.status != BookingStatus::Rejected && b.span.ended_before(now))
        .max_by_key(|b| (b.span.end, b.id))
}

/// Nearest upcoming booking: among non-rejected bookings with `start > now`,
/// the one with the smallest start (ties: lowest id).
pub fn next_booking(bookings: &[Booking], now: Ms) -> Option<&Booking> {
    bookings
        .iter()
        .filter(|b| b.status != BookingStatus::Rejected && b.span.starts_after(now))
        .min_by_key(|b| (b.span.start, b.id))
}

/// Assemble the public view of an item for `viewer_id`.
///
/// Comments are always included. Last/next booking are owner-only: for anyone
/// else they are `None` no matter what bookings exist.
pub fn build_item_view<F>(viewer_id: Id, state: &ItemState, author_name: F, now: Ms) -> ItemView
where
    F: Fn(Id) -> String,
{
    let item = &state.item;
    let (last, next) = if viewer_id == item.owner_id {
        (
            last_booking(&state.bookings, now).map(BookingBrief::from),
            next_booking(&state.bookings, now).map(BookingBrief::from),
        )
    } else {
        (None, None)
    };

    let comments = state
        .comments
        .iter()
        .map(|c| CommentView {
            id: c.id,
            item_id: c.item_id,
            text: c.text.clone(),
            author_name: author_name(c.author_id),
            created: c.created,
        })
        .collect();

    ItemView {
        id: item.id,
        name: item.name.clone(),
        description: item.description.clone(),
        available: item.available,
        owner_id: item.owner_id,
        request_id: item.request_id,
        last_booking: last,
        next_booking: next,
        comments,
    }
}
