use crate::model::{BookingStatus, EntityKind, Id};

/// Why a booking request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingDenial {
    ItemUnavailable,
    OwnItem,
}

#[derive(Debug, PartialEq, Eq)]
pub enum EngineError {
    NotFound(EntityKind, Id),
    AccessDenied(String),
    BookingDenied(BookingDenial),
    /// Approval change on a booking that already left `WAITING`.
    BookingAlreadyDecided {
        id: Id,
        status: BookingStatus,
    },
    CommentNotAllowed {
        user_id: Id,
        item_id: Id,
    },
    UniqueConstraintViolation(String),
    /// Deletion refused while other records still point at the entity.
    Referenced(EntityKind, Id),
    Invalid(&'static str),
    WalError(String),
}

impl EngineError {
    /// Stable label the boundary puts on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(..) => "NOT_FOUND",
            EngineError::AccessDenied(_) => "ACCESS_DENIED",
            EngineError::BookingDenied(_) => "BOOKING_DENIED",
            EngineError::BookingAlreadyDecided { .. } => "BOOKING_ALREADY_DECIDED",
            EngineError::CommentNotAllowed { .. } => "COMMENT_NOT_ALLOWED",
            EngineError::UniqueConstraintViolation(_) => "UNIQUE_CONSTRAINT_VIOLATION",
            EngineError::Referenced(..) => "REFERENCED",
            EngineError::Invalid(_) => "INVALID",
            EngineError::WalError(_) => "INTERNAL",
        }
    }

    /// HTTP-style status intent.
    pub fn status(&self) -> u16 {
        match self {
            EngineError::NotFound(..) => 404,
            EngineError::AccessDenied(_) => 403,
            EngineError::BookingDenied(_)
            | EngineError::BookingAlreadyDecided { .. }
            | EngineError::CommentNotAllowed { .. }
            | EngineError::Invalid(_) => 400,
            EngineError::UniqueConstraintViolation(_) | EngineError::Referenced(..) => 409,
            EngineError::WalError(_) => 500,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(kind, id) => write!(f, "{} {id} not found", kind.as_str()),
            EngineError::AccessDenied(msg) => write!(f, "access denied: {msg}"),
            EngineError::BookingDenied(BookingDenial::ItemUnavailable) => {
                write!(f, "booking denied: item is not available")
            }
            EngineError::BookingDenied(BookingDenial::OwnItem) => {
                write!(f, "booking denied: cannot book your own item")
            }
            EngineError::BookingAlreadyDecided { id, status } => {
                write!(f, "booking {id} has already been {}", status.as_str())
            }
            EngineError::CommentNotAllowed { user_id, item_id } => write!(
                f,
                "user {user_id} has no finished booking of item {item_id} and cannot comment on it"
            ),
            EngineError::UniqueConstraintViolation(msg) => {
                write!(f, "unique constraint violation: {msg}")
            }
            EngineError::Referenced(kind, id) => {
                write!(f, "cannot delete {} {id}: still referenced", kind.as_str())
            }
            EngineError::Invalid(msg) => write!(f, "invalid input: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
