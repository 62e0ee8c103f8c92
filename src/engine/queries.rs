use std::cmp::Reverse;
use std::collections::HashMap;

use crate::limits::MAX_SEARCH_TEXT_LEN;
use crate::model::*;

use super::aggregate::build_item_view;
use super::guard::ensure_can_view_booking;
use super::lifecycle::select_bookings;
use super::{Engine, EngineError};

impl Engine {
    // ── Users ────────────────────────────────────────────────

    pub fn get_user(&self, user_id: Id) -> Result<User, EngineError> {
        self.resolve_user(user_id)
    }

    pub fn list_users(&self) -> Vec<User> {
        self.store.list_users()
    }

    // ── Bookings ─────────────────────────────────────────────

    fn booking_view(&self, booking: &Booking, item: &Item) -> Result<BookingView, EngineError> {
        let booker = self
            .store
            .get_user(booking.booker_id)
            .ok_or(EngineError::NotFound(EntityKind::User, booking.booker_id))?;
        Ok(BookingView {
            id: booking.id,
            start: booking.span.start,
            end: booking.span.end,
            status: booking.status,
            item: item.clone(),
            booker,
        })
    }

    /// Visible to the booker and the item's owner only.
    pub async fn get_booking(
        &self,
        viewer_id: Id,
        booking_id: Id,
    ) -> Result<BookingView, EngineError> {
        self.resolve_user(viewer_id)?;
        let state = self.get_booking_item_state(booking_id)?;
        let guard = state.read().await;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(EntityKind::Booking, booking_id))?;
        ensure_can_view_booking(booking, &guard.item, viewer_id)?;
        self.booking_view(booking, &guard.item)
    }

    /// Bookings made by `user_id`, filtered by `state` and ordered latest start first.
    pub async fn list_bookings_as_booker(
        &self,
        user_id: Id,
        state: BookingState,
    ) -> Result<Vec<BookingView>, EngineError> {
        self.resolve_user(user_id)?;
        let now = self.now();

        let mut item_ids: Vec<Id> = self
            .store
            .bookings_by_booker(user_id)
            .into_iter()
            .filter_map(|booking_id| self.store.item_for_booking(booking_id))
            .collect();
        item_ids.sort_unstable();
        item_ids.dedup();

        let mut bookings = Vec::new();
        let mut items = HashMap::new();
        for item_id in item_ids {
            let Some(shared) = self.store.get_item(item_id) else {
                continue;
            };
            let guard = shared.read().await;
            bookings.extend(
                guard
                    .bookings
                    .iter()
                    .filter(|b| b.booker_id == user_id)
                    .cloned(),
            );
            items.insert(item_id, guard.item.clone());
        }

        self.booking_views(select_bookings(&bookings, state, now), &items)
    }

    /// Bookings of every item `user_id` owns, filtered by `state` and ordered latest start first.
    pub async fn list_bookings_as_owner(
        &self,
        user_id: Id,
        state: BookingState,
    ) -> Result<Vec<BookingView>, EngineError> {
        self.resolve_user(user_id)?;
        let now = self.now();

        let mut bookings = Vec::new();
        let mut items = HashMap::new();
        for item_id in self.store.items_by_owner(user_id) {
            let Some(shared) = self.store.get_item(item_id) else {
                continue;
            };
            let guard = shared.read().await;
            bookings.extend(guard.bookings.iter().cloned());
            items.insert(item_id, guard.item.clone());
        }

        self.booking_views(select_bookings(&bookings, state, now), &items)
    }

    fn booking_views(
        &self,
        selected: Vec<Booking>,
        items: &HashMap<Id, Item>,
    ) -> Result<Vec<BookingView>, EngineError> {
        selected
            .iter()
            .map(|b| {
                let item = items
                    .get(&b.item_id)
                    .ok_or(EngineError::NotFound(EntityKind::Item, b.item_id))?;
                self.booking_view(b, item)
            })
            .collect()
    }

    // ── Items ────────────────────────────────────────────────

    /// Item with comments; last/next booking only when `viewer_id` owns it.
    pub async fn get_item_view(&self, viewer_id: Id, item_id: Id) -> Result<ItemView, EngineError> {
        self.resolve_user(viewer_id)?;
        let state = self.get_item_state(item_id)?;
        let guard = state.read().await;
        if guard.deleted {
            return Err(EngineError::NotFound(EntityKind::Item, item_id));
        }
        let now = self.now();
        Ok(build_item_view(
            viewer_id,
            &guard,
            |id| self.author_name(id),
            now,
        ))
    }

    /// Every item of `owner_id`, by id, each aggregated against the same instant.
    pub async fn list_items_for_owner(&self, owner_id: Id) -> Result<Vec<ItemView>, EngineError> {
        self.resolve_user(owner_id)?;
        let now = self.now();
        let mut views = Vec::new();
        for item_id in self.store.items_by_owner(owner_id) {
            let Some(state) = self.store.get_item(item_id) else {
                continue;
            };
            let guard = state.read().await;
            if guard.deleted {
                continue;
            }
            views.push(build_item_view(
                owner_id,
                &guard,
                |id| self.author_name(id),
                now,
            ));
        }
        Ok(views)
    }

    /// Available items whose name or description contains `text`, ignoring case.
    /// Blank text finds nothing.
    pub async fn search_items(&self, text: &str) -> Result<Vec<Item>, EngineError> {
        if text.chars().count() > MAX_SEARCH_TEXT_LEN {
            return Err(EngineError::Invalid("search text too long"));
        }
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for item_id in self.store.item_ids() {
            let Some(state) = self.store.get_item(item_id) else {
                continue;
            };
            let guard = state.read().await;
            let item = &guard.item;
            if !guard.deleted
                && item.available
                && (item.name.to_lowercase().contains(&needle)
                    || item.description.to_lowercase().contains(&needle))
            {
                found.push(item.clone());
            }
        }
        Ok(found)
    }

    // ── Item requests ────────────────────────────────────────

    async fn request_view(&self, request: ItemRequest) -> RequestView {
        let mut items = Vec::new();
        for item_id in self.store.items_by_request(request.id) {
            if let Some(state) = self.store.get_item(item_id) {
                let guard = state.read().await;
                if !guard.deleted {
                    items.push(guard.item.clone());
                }
            }
        }
        RequestView {
            id: request.id,
            requester_id: request.requester_id,
            description: request.description,
            created: request.created,
            items,
        }
    }

    async fn request_views(&self, mut requests: Vec<ItemRequest>) -> Vec<RequestView> {
        requests.sort_by_key(|r| Reverse((r.created, r.id)));
        let mut views = Vec::with_capacity(requests.len());
        for request in requests {
            views.push(self.request_view(request).await);
        }
        views
    }

    pub async fn get_request(
        &self,
        viewer_id: Id,
        request_id: Id,
    ) -> Result<RequestView, EngineError> {
        self.resolve_user(viewer_id)?;
        let request = self
            .store
            .get_request(request_id)
            .ok_or(EngineError::NotFound(EntityKind::Request, request_id))?;
        Ok(self.request_view(request).await)
    }

    /// The user's own requests, newest first.
    pub async fn list_own_requests(&self, user_id: Id) -> Result<Vec<RequestView>, EngineError> {
        self.resolve_user(user_id)?;
        let own = self
            .store
            .list_requests()
            .into_iter()
            .filter(|r| r.requester_id == user_id)
            .collect();
        Ok(self.request_views(own).await)
    }

    /// Everybody else's requests, newest first.
    pub async fn list_other_requests(&self, user_id: Id) -> Result<Vec<RequestView>, EngineError> {
        self.resolve_user(user_id)?;
        let others = self
            .store
            .list_requests()
            .into_iter()
            .filter(|r| r.requester_id != user_id)
            .collect();
        Ok(self.request_views(others).await)
    }
}
