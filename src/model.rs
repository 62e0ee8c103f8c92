use serde::{Deserialize, Serialize};

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// Numeric identifier, allocated per entity kind.
pub type Id = u64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// `start <= t < end`
    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    pub fn ended_before(&self, t: Ms) -> bool {
        self.end < t
    }

    pub fn starts_after(&self, t: Ms) -> bool {
        self.start > t
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    User,
    Item,
    Booking,
    Comment,
    Request,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Item => "item",
            EntityKind::Booking => "booking",
            EntityKind::Comment => "comment",
            EntityKind::Request => "item request",
        }
    }
}

/// Booking lifecycle. `Waiting` is initial; the other two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Waiting,
    Approved,
    Rejected,
}

impl BookingStatus {
    pub fn is_decided(&self) -> bool {
        !matches!(self, BookingStatus::Waiting)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Waiting => "WAITING",
            BookingStatus::Approved => "APPROVED",
            BookingStatus::Rejected => "REJECTED",
        }
    }
}

/// Filter applied to a booking listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookingState {
    #[default]
    All,
    Current,
    Past,
    Future,
    Waiting,
    Rejected,
}

impl BookingState {
    /// Case-sensitive. Anything unrecognised (or absent) means `All`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("CURRENT") => BookingState::Current,
            Some("PAST") => BookingState::Past,
            Some("FUTURE") => BookingState::Future,
            Some("WAITING") => BookingState::Waiting,
            Some("REJECTED") => BookingState::Rejected,
            _ => BookingState::All,
        }
    }

    pub fn matches(&self, booking: &Booking, now: Ms) -> bool {
        match self {
            BookingState::All => true,
            BookingState::Current => booking.span.contains_instant(now),
            BookingState::Past => booking.span.ended_before(now),
            BookingState::Future => booking.span.starts_after(now),
            BookingState::Waiting => booking.status == BookingStatus::Waiting,
            BookingState::Rejected => booking.status == BookingStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: Id,
    pub owner_id: Id,
    pub name: String,
    pub description: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_id: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Id,
    pub item_id: Id,
    pub booker_id: Id,
    pub span: Span,
    pub status: BookingStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Id,
    pub item_id: Id,
    pub author_id: Id,
    pub text: String,
    pub created: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRequest {
    pub id: Id,
    pub requester_id: Id,
    pub description: String,
    pub created: Ms,
}

/// An item together with everything that hangs off it. Guarded by one lock.
#[derive(Debug, Clone)]
pub struct ItemState {
    pub item: Item,
    /// Sorted by `span.start`.
    pub bookings: Vec<Booking>,
    /// Creation order.
    pub comments: Vec<Comment>,
    /// Set under the write lock when the item is deleted. A handle cloned
    /// before the delete still points here and must see the item as gone.
    pub deleted: bool,
}

impl ItemState {
    pub fn new(item: Item) -> Self {
        Self {
            item,
            bookings: Vec::new(),
            comments: Vec::new(),
            deleted: false,
        }
    }

    /// Insert booking maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .partition_point(|b| b.span.start <= booking.span.start);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: Id) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Id) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }
}

/// The event types. Flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UserCreated {
        id: Id,
        name: String,
        email: String,
    },
    UserUpdated {
        id: Id,
        name: String,
        email: String,
    },
    UserDeleted {
        id: Id,
    },
    ItemCreated {
        id: Id,
        owner_id: Id,
        name: String,
        description: String,
        available: bool,
        request_id: Option<Id>,
    },
    ItemUpdated {
        id: Id,
        name: String,
        description: String,
        available: bool,
    },
    ItemDeleted {
        id: Id,
        owner_id: Id,
        request_id: Option<Id>,
    },
    BookingCreated {
        id: Id,
        item_id: Id,
        booker_id: Id,
        span: Span,
        status: BookingStatus,
    },
    BookingStatusChanged {
        id: Id,
        item_id: Id,
        status: BookingStatus,
    },
    CommentAdded {
        id: Id,
        item_id: Id,
        author_id: Id,
        text: String,
        created: Ms,
    },
    RequestCreated {
        id: Id,
        requester_id: Id,
        description: String,
        created: Ms,
    },
    /// Counter high-water mark, written by compaction so ids of deleted
    /// entities stay retired after a restart.
    IdsReserved {
        kind: EntityKind,
        last: Id,
    },
}

impl Event {
    /// The item whose lock must be held while applying this event, if any.
    pub fn item_id(&self) -> Option<Id> {
        match self {
            Event::ItemUpdated { id, .. } => Some(*id),
            Event::BookingCreated { item_id, .. }
            | Event::BookingStatusChanged { item_id, .. }
            | Event::CommentAdded { item_id, .. } => Some(*item_id),
            Event::UserCreated { .. }
            | Event::UserUpdated { .. }
            | Event::UserDeleted { .. }
            | Event::ItemCreated { .. }
            | Event::ItemDeleted { .. }
            | Event::RequestCreated { .. }
            | Event::IdsReserved { .. } => None,
        }
    }

    /// The newly allocated id this event introduces, for counter recovery on replay.
    pub fn allocated_id(&self) -> Option<(EntityKind, Id)> {
        match self {
            Event::UserCreated { id, .. } => Some((EntityKind::User, *id)),
            Event::ItemCreated { id, .. } => Some((EntityKind::Item, *id)),
            Event::BookingCreated { id, .. } => Some((EntityKind::Booking, *id)),
            Event::CommentAdded { id, .. } => Some((EntityKind::Comment, *id)),
            Event::RequestCreated { id, .. } => Some((EntityKind::Request, *id)),
            Event::IdsReserved { kind, last } => Some((*kind, *last)),
            _ => None,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// Full booking as returned to the booker or the owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingView {
    pub id: Id,
    pub start: Ms,
    pub end: Ms,
    pub status: BookingStatus,
    pub item: Item,
    pub booker: User,
}

/// Booking reference embedded in an item view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingBrief {
    pub id: Id,
    pub item_id: Id,
    pub booker_id: Id,
    pub start: Ms,
    pub end: Ms,
    pub status: BookingStatus,
}

impl From<&Booking> for BookingBrief {
    fn from(b: &Booking) -> Self {
        Self {
            id: b.id,
            item_id: b.item_id,
            booker_id: b.booker_id,
            start: b.span.start,
            end: b.span.end,
            status: b.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentView {
    pub id: Id,
    pub item_id: Id,
    pub text: String,
    pub author_name: String,
    pub created: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemView {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub available: bool,
    pub owner_id: Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Id>,
    pub last_booking: Option<BookingBrief>,
    pub next_booking: Option<BookingBrief>,
    pub comments: Vec<CommentView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestView {
    pub id: Id,
    pub requester_id: Id,
    pub description: String,
    pub created: Ms,
    pub items: Vec<Item>,
}
