//! Who may do what to which booking or item. Pure decisions, no I/O.

use crate::limits::*;
use crate::model::*;

use super::error::{BookingDenial, EngineError};

/// `None` when `requester_id` may book `item`; otherwise the first reason they may not.
pub fn booking_denial(item: &Item, requester_id: Id) -> Option<BookingDenial> {
    if !item.available {
        return Some(BookingDenial::ItemUnavailable);
    }
    if item.owner_id == requester_id {
        return Some(BookingDenial::OwnItem);
    }
    None
}

pub fn can_create_booking(item: &Item, requester_id: Id) -> bool {
    booking_denial(item, requester_id).is_none()
}

/// Only the booker and the item's owner may see a booking.
pub fn can_view_booking(booking: &Booking, item: &Item, viewer_id: Id) -> bool {
    viewer_id == booking.booker_id || viewer_id == item.owner_id
}

pub fn can_change_status(item: &Item, actor_id: Id) -> bool {
    actor_id == item.owner_id
}

pub fn can_update_item(item: &Item, actor_id: Id) -> bool {
    actor_id == item.owner_id
}

pub(crate) fn ensure_can_create_booking(item: &Item, requester_id: Id) -> Result<(), EngineError> {
    match booking_denial(item, requester_id) {
        Some(reason) => Err(EngineError::BookingDenied(reason)),
        None => Ok(()),
    }
}

pub(crate) fn ensure_can_view_booking(
    booking: &Booking,
    item: &Item,
    viewer_id: Id,
) -> Result<(), EngineError> {
    if can_view_booking(booking, item, viewer_id) {
        return Ok(());
    }
    Err(EngineError::AccessDenied(format!(
        "user {viewer_id} is neither the booker nor the owner of booking {}",
        booking.id
    )))
}

pub(crate) fn ensure_can_change_status(item: &Item, actor_id: Id) -> Result<(), EngineError> {
    if can_change_status(item, actor_id) {
        return Ok(());
    }
    Err(EngineError::AccessDenied(format!(
        "user {actor_id} is not the owner of item {}",
        item.id
    )))
}

pub(crate) fn ensure_can_update_item(item: &Item, actor_id: Id) -> Result<(), EngineError> {
    if can_update_item(item, actor_id) {
        return Ok(());
    }
    Err(EngineError::AccessDenied(format!(
        "user {actor_id} cannot modify someone else's item {}",
        item.id
    )))
}

// ── Input checks ─────────────────────────────────────────

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::Invalid("booking end must be after its start"));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::Invalid("timestamp out of range"));
    }
    Ok(())
}

fn validate_text(
    value: &str,
    max_len: usize,
    blank: &'static str,
    too_long: &'static str,
) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::Invalid(blank));
    }
    if value.chars().count() > max_len {
        return Err(EngineError::Invalid(too_long));
    }
    Ok(())
}

pub(crate) fn validate_user_name(name: &str) -> Result<(), EngineError> {
    validate_text(
        name,
        MAX_USER_NAME_LEN,
        "user name must not be blank",
        "user name too long",
    )
}

pub(crate) fn validate_email(email: &str) -> Result<(), EngineError> {
    validate_text(email, MAX_EMAIL_LEN, "email must not be blank", "email too long")?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(EngineError::Invalid("email must look like local@domain")),
    }
}

pub(crate) fn validate_item_name(name: &str) -> Result<(), EngineError> {
    validate_text(
        name,
        MAX_ITEM_NAME_LEN,
        "item name must not be blank",
        "item name too long",
    )
}

pub(crate) fn validate_description(description: &str) -> Result<(), EngineError> {
    validate_text(
        description,
        MAX_DESCRIPTION_LEN,
        "description must not be blank",
        "description too long",
    )
}

pub(crate) fn validate_comment(text: &str) -> Result<(), EngineError> {
    validate_text(
        text,
        MAX_COMMENT_LEN,
        "comment must not be blank",
        "comment too long",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: Id = 1;
    const BOOKER: Id = 2;
    const STRANGER: Id = 3;

    fn item(available: bool) -> Item {
        Item {
            id: 10,
            owner_id: OWNER,
            name: "Ladder".into(),
            description: "Three metres".into(),
            available,
            request_id: None,
        }
    }

    fn booking() -> Booking {
        Booking {
            id: 100,
            item_id: 10,
            booker_id: BOOKER,
            span: Span::new(1_000, 2_000),
            status: BookingStatus::Waiting,
        }
    }

    #[test]
    fn booking_requires_available_item_of_someone_else() {
        assert!(can_create_booking(&item(true), BOOKER));
        assert_eq!(
            booking_denial(&item(false), BOOKER),
            Some(BookingDenial::ItemUnavailable)
        );
        assert_eq!(booking_denial(&item(true), OWNER), Some(BookingDenial::OwnItem));
        // unavailable wins when both apply
        assert_eq!(
            booking_denial(&item(false), OWNER),
            Some(BookingDenial::ItemUnavailable)
        );
    }

    #[test]
    fn view_rights() {
        let it = item(true);
        let b = booking();
        assert!(can_view_booking(&b, &it, BOOKER));
        assert!(can_view_booking(&b, &it, OWNER));
        assert!(!can_view_booking(&b, &it, STRANGER));
        assert!(matches!(
            ensure_can_view_booking(&b, &it, STRANGER),
            Err(EngineError::AccessDenied(_))
        ));
    }

    #[test]
    fn only_owner_changes_status_or_item() {
        let it = item(true);
        assert!(can_change_status(&it, OWNER));
        assert!(!can_change_status(&it, BOOKER));
        assert!(can_update_item(&it, OWNER));
        assert!(!can_update_item(&it, STRANGER));
        assert!(ensure_can_update_item(&it, STRANGER).is_err());
        assert!(ensure_can_change_status(&it, OWNER).is_ok());
    }

    #[test]
    fn span_validation() {
        let day = 86_400_000;
        let t = MIN_VALID_TIMESTAMP_MS + 10 * day;
        assert!(validate_span(&Span { start: t, end: t + day }).is_ok());
        assert!(validate_span(&Span { start: t, end: t }).is_err());
        assert!(validate_span(&Span { start: t + 1, end: t }).is_err());
        assert!(validate_span(&Span { start: 0, end: t }).is_err());
    }

    #[test]
    fn text_validation() {
        assert!(validate_item_name("Drill").is_ok());
        assert!(validate_item_name("   ").is_err());
        assert!(validate_item_name(&"x".repeat(MAX_ITEM_NAME_LEN + 1)).is_err());
        assert!(validate_description(&"d".repeat(MAX_DESCRIPTION_LEN)).is_ok());
        assert!(validate_email("ann@example.com").is_ok());
        assert!(validate_email("ann.example.com").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_comment("").is_err());
        assert!(validate_user_name("Ann").is_ok());
    }
}
