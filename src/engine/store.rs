use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;

use crate::model::*;

pub type SharedItemState = Arc<RwLock<ItemState>>;

/// Storage seam the engine is written against.
///
/// Items are handed out as shared, lockable state: whoever holds the write
/// lock of an item owns its bookings and comments for the duration of an
/// operation. Everything else is plain keyed lookup plus secondary indexes.
pub trait Store: Send + Sync {
    /// Allocate the next id for `kind`. Ids start at 1 and are never reused.
    fn next_id(&self, kind: EntityKind) -> Id;
    /// Make sure future allocations for `kind` land above `id` (log replay).
    fn observe_id(&self, kind: EntityKind, id: Id);
    /// Highest id handed out so far for `kind`, 0 when none.
    fn last_id(&self, kind: EntityKind) -> Id;

    fn get_user(&self, id: Id) -> Option<User>;
    /// Atomically reserve `email` for `user_id`. Returns false when another user holds it.
    fn claim_email(&self, email: &str, user_id: Id) -> bool;
    /// Drop a reservation, but only if `user_id` holds it.
    fn release_email(&self, email: &str, user_id: Id);
    fn put_user(&self, user: User);
    fn remove_user(&self, id: Id) -> Option<User>;
    /// Ordered by id.
    fn list_users(&self) -> Vec<User>;

    fn get_item(&self, id: Id) -> Option<SharedItemState>;
    fn insert_item(&self, item: Item) -> SharedItemState;
    fn remove_item(&self, id: Id, owner_id: Id, request_id: Option<Id>);
    /// Ordered by id.
    fn item_ids(&self) -> Vec<Id>;
    /// Ordered by id.
    fn items_by_owner(&self, owner_id: Id) -> Vec<Id>;
    /// Ordered by id.
    fn items_by_request(&self, request_id: Id) -> Vec<Id>;

    fn index_booking(&self, booking_id: Id, item_id: Id, booker_id: Id);
    fn item_for_booking(&self, booking_id: Id) -> Option<Id>;
    fn bookings_by_booker(&self, booker_id: Id) -> Vec<Id>;

    fn index_comment(&self, comment_id: Id, author_id: Id);
    fn has_comments_by(&self, author_id: Id) -> bool;

    fn get_request(&self, id: Id) -> Option<ItemRequest>;
    fn put_request(&self, request: ItemRequest);
    /// Ordered by id.
    fn list_requests(&self) -> Vec<ItemRequest>;
}

pub struct InMemoryStore {
    counters: [AtomicU64; 5],
    users: DashMap<Id, User>,
    emails: DashMap<String, Id>,
    items: DashMap<Id, SharedItemState>,
    owner_items: DashMap<Id, Vec<Id>>,
    request_items: DashMap<Id, Vec<Id>>,
    booking_to_item: DashMap<Id, Id>,
    booker_bookings: DashMap<Id, Vec<Id>>,
    author_comments: DashMap<Id, Vec<Id>>,
    requests: DashMap<Id, ItemRequest>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            counters: Default::default(),
            users: DashMap::new(),
            emails: DashMap::new(),
            items: DashMap::new(),
            owner_items: DashMap::new(),
            request_items: DashMap::new(),
            booking_to_item: DashMap::new(),
            booker_bookings: DashMap::new(),
            author_comments: DashMap::new(),
            requests: DashMap::new(),
        }
    }

    fn counter(&self, kind: EntityKind) -> &AtomicU64 {
        let idx = match kind {
            EntityKind::User => 0,
            EntityKind::Item => 1,
            EntityKind::Booking => 2,
            EntityKind::Comment => 3,
            EntityKind::Request => 4,
        };
        &self.counters[idx]
    }
}

fn sorted_ids(index: &DashMap<Id, Vec<Id>>, key: Id) -> Vec<Id> {
    let mut ids = index
        .get(&key)
        .map(|e| e.value().clone())
        .unwrap_or_default();
    ids.sort_unstable();
    ids
}

fn unindex(index: &DashMap<Id, Vec<Id>>, key: Id, id: Id) {
    if let Some(mut ids) = index.get_mut(&key) {
        ids.retain(|i| *i != id);
    }
}

impl Store for InMemoryStore {
    fn next_id(&self, kind: EntityKind) -> Id {
        self.counter(kind).fetch_add(1, Ordering::SeqCst) + 1
    }

    fn observe_id(&self, kind: EntityKind, id: Id) {
        self.counter(kind).fetch_max(id, Ordering::SeqCst);
    }

    fn last_id(&self, kind: EntityKind) -> Id {
        self.counter(kind).load(Ordering::SeqCst)
    }

    // ── Users ────────────────────────────────────────────────

    fn get_user(&self, id: Id) -> Option<User> {
        self.users.get(&id).map(|e| e.value().clone())
    }

    fn claim_email(&self, email: &str, user_id: Id) -> bool {
        match self.emails.entry(email.to_string()) {
            Entry::Occupied(e) => *e.get() == user_id,
            Entry::Vacant(e) => {
                e.insert(user_id);
                true
            }
        }
    }

    fn release_email(&self, email: &str, user_id: Id) {
        self.emails.remove_if(email, |_, owner| *owner == user_id);
    }

    fn put_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    fn remove_user(&self, id: Id) -> Option<User> {
        let (_, user) = self.users.remove(&id)?;
        self.release_email(&user.email, id);
        Some(user)
    }

    fn list_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_unstable_by_key(|u| u.id);
        users
    }

    // ── Items ────────────────────────────────────────────────

    fn get_item(&self, id: Id) -> Option<SharedItemState> {
        self.items.get(&id).map(|e| e.value().clone())
    }

    fn insert_item(&self, item: Item) -> SharedItemState {
        let id = item.id;
        self.owner_items.entry(item.owner_id).or_default().push(id);
        if let Some(request_id) = item.request_id {
            self.request_items.entry(request_id).or_default().push(id);
        }
        let state = Arc::new(RwLock::new(ItemState::new(item)));
        self.items.insert(id, state.clone());
        state
    }

    fn remove_item(&self, id: Id, owner_id: Id, request_id: Option<Id>) {
        self.items.remove(&id);
        unindex(&self.owner_items, owner_id, id);
        if let Some(request_id) = request_id {
            unindex(&self.request_items, request_id, id);
        }
    }

    fn item_ids(&self) -> Vec<Id> {
        let mut ids: Vec<Id> = self.items.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    fn items_by_owner(&self, owner_id: Id) -> Vec<Id> {
        sorted_ids(&self.owner_items, owner_id)
    }

    fn items_by_request(&self, request_id: Id) -> Vec<Id> {
        sorted_ids(&self.request_items, request_id)
    }

    // ── Booking / comment indexes ────────────────────────────

    fn index_booking(&self, booking_id: Id, item_id: Id, booker_id: Id) {
        self.booking_to_item.insert(booking_id, item_id);
        self.booker_bookings.entry(booker_id).or_default().push(booking_id);
    }

    fn item_for_booking(&self, booking_id: Id) -> Option<Id> {
        self.booking_to_item.get(&booking_id).map(|e| *e.value())
    }

    fn bookings_by_booker(&self, booker_id: Id) -> Vec<Id> {
        sorted_ids(&self.booker_bookings, booker_id)
    }

    fn index_comment(&self, comment_id: Id, author_id: Id) {
        self.author_comments.entry(author_id).or_default().push(comment_id);
    }

    fn has_comments_by(&self, author_id: Id) -> bool {
        self.author_comments
            .get(&author_id)
            .is_some_and(|ids| !ids.is_empty())
    }

    // ── Requests ─────────────────────────────────────────────

    fn get_request(&self, id: Id) -> Option<ItemRequest> {
        self.requests.get(&id).map(|e| e.value().clone())
    }

    fn put_request(&self, request: ItemRequest) {
        self.requests.insert(request.id, request);
    }

    fn list_requests(&self) -> Vec<ItemRequest> {
        let mut requests: Vec<ItemRequest> =
            self.requests.iter().map(|e| e.value().clone()).collect();
        requests.sort_unstable_by_key(|r| r.id);
        requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: Id, owner_id: Id, request_id: Option<Id>) -> Item {
        Item {
            id,
            owner_id,
            name: format!("item{id}"),
            description: "desc".into(),
            available: true,
            request_id,
        }
    }

    #[test]
    fn ids_are_per_kind_and_monotonic() {
        let store = InMemoryStore::new();
        assert_eq!(store.next_id(EntityKind::User), 1);
        assert_eq!(store.next_id(EntityKind::User), 2);
        assert_eq!(store.next_id(EntityKind::Item), 1);
        store.observe_id(EntityKind::Booking, 41);
        assert_eq!(store.next_id(EntityKind::Booking), 42);
        // observing a lower id never moves the counter back
        store.observe_id(EntityKind::Booking, 3);
        assert_eq!(store.next_id(EntityKind::Booking), 43);
        assert_eq!(store.last_id(EntityKind::Booking), 43);
        assert_eq!(store.last_id(EntityKind::Comment), 0);
    }

    #[test]
    fn email_claims_are_exclusive() {
        let store = InMemoryStore::new();
        assert!(store.claim_email("a@x.io", 1));
        assert!(store.claim_email("a@x.io", 1)); // re-claim by holder is fine
        assert!(!store.claim_email("a@x.io", 2));
        store.release_email("a@x.io", 2); // not the holder: no-op
        assert!(!store.claim_email("a@x.io", 2));
        store.release_email("a@x.io", 1);
        assert!(store.claim_email("a@x.io", 2));
    }

    #[test]
    fn remove_user_frees_email() {
        let store = InMemoryStore::new();
        store.claim_email("a@x.io", 1);
        store.put_user(User {
            id: 1,
            name: "Ann".into(),
            email: "a@x.io".into(),
        });
        assert!(!store.claim_email("a@x.io", 5));
        assert!(store.remove_user(1).is_some());
        assert!(store.claim_email("a@x.io", 5));
    }

    #[test]
    fn item_indexes_follow_insert_and_remove() {
        let store = InMemoryStore::new();
        store.insert_item(item(2, 7, Some(3)));
        store.insert_item(item(1, 7, None));
        store.insert_item(item(3, 8, Some(3)));
        assert_eq!(store.items_by_owner(7), vec![1, 2]);
        assert_eq!(store.items_by_request(3), vec![2, 3]);
        assert_eq!(store.item_ids(), vec![1, 2, 3]);

        store.remove_item(2, 7, Some(3));
        assert_eq!(store.items_by_owner(7), vec![1]);
        assert_eq!(store.items_by_request(3), vec![3]);
        assert!(store.get_item(2).is_none());
    }

    #[test]
    fn booking_index() {
        let store = InMemoryStore::new();
        store.index_booking(10, 1, 5);
        store.index_booking(4, 2, 5);
        assert_eq!(store.item_for_booking(10), Some(1));
        assert_eq!(store.bookings_by_booker(5), vec![4, 10]);
        assert!(store.bookings_by_booker(6).is_empty());
        assert!(store.item_for_booking(99).is_none());
    }
}
