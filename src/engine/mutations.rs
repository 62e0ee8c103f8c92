use tokio::sync::oneshot;

use crate::model::*;

use super::eligibility::can_comment;
use super::guard::*;
use super::lifecycle::decide;
use super::{Engine, EngineError, WalCommand};

impl Engine {
    // ── Users ────────────────────────────────────────────────

    pub async fn create_user(&self, name: String, email: String) -> Result<User, EngineError> {
        validate_user_name(&name)?;
        validate_email(&email)?;

        let _gate = self.commit_gate.read().await;
        let _users = self.user_gate.lock().await;
        let id = self.store.next_id(EntityKind::User);
        if !self.store.claim_email(&email, id) {
            return Err(EngineError::UniqueConstraintViolation(format!(
                "email {email} is already registered"
            )));
        }

        let event = Event::UserCreated {
            id,
            name: name.clone(),
            email: email.clone(),
        };
        if let Err(e) = self.persist_global(&event).await {
            self.store.release_email(&email, id);
            return Err(e);
        }
        Ok(User { id, name, email })
    }

    /// Partial update: `None` keeps the current value.
    pub async fn update_user(
        &self,
        user_id: Id,
        name: Option<String>,
        email: Option<String>,
    ) -> Result<User, EngineError> {
        let _gate = self.commit_gate.read().await;
        let _users = self.user_gate.lock().await;
        let current = self.resolve_user(user_id)?;
        let name = name.unwrap_or(current.name);
        let email = email.unwrap_or(current.email.clone());
        validate_user_name(&name)?;
        validate_email(&email)?;

        let email_changed = email != current.email;
        if email_changed && !self.store.claim_email(&email, user_id) {
            return Err(EngineError::UniqueConstraintViolation(format!(
                "email {email} is already registered"
            )));
        }

        let event = Event::UserUpdated {
            id: user_id,
            name: name.clone(),
            email: email.clone(),
        };
        if let Err(e) = self.persist_global(&event).await {
            if email_changed {
                self.store.release_email(&email, user_id);
            }
            return Err(e);
        }
        Ok(User {
            id: user_id,
            name,
            email,
        })
    }

    /// Refused while anything still refers to the user. Holds the commit gate
    /// exclusively: every other mutation resolves its acting user under the
    /// shared gate, so none can add a reference between the check and the delete.
    pub async fn delete_user(&self, user_id: Id) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;
        self.resolve_user(user_id)?;

        let has_requests = self
            .store
            .list_requests()
            .iter()
            .any(|r| r.requester_id == user_id);
        if !self.store.items_by_owner(user_id).is_empty()
            || !self.store.bookings_by_booker(user_id).is_empty()
            || self.store.has_comments_by(user_id)
            || has_requests
        {
            return Err(EngineError::Referenced(EntityKind::User, user_id));
        }

        self.persist_global(&Event::UserDeleted { id: user_id }).await
    }

    // ── Items ────────────────────────────────────────────────

    pub async fn create_item(
        &self,
        owner_id: Id,
        name: String,
        description: String,
        available: bool,
        request_id: Option<Id>,
    ) -> Result<Item, EngineError> {
        let _gate = self.commit_gate.read().await;
        self.resolve_user(owner_id)?;
        validate_item_name(&name)?;
        validate_description(&description)?;
        if let Some(request_id) = request_id
            && self.store.get_request(request_id).is_none()
        {
            return Err(EngineError::NotFound(EntityKind::Request, request_id));
        }

        let item = Item {
            id: self.store.next_id(EntityKind::Item),
            owner_id,
            name,
            description,
            available,
            request_id,
        };
        let event = Event::ItemCreated {
            id: item.id,
            owner_id,
            name: item.name.clone(),
            description: item.description.clone(),
            available,
            request_id,
        };
        self.persist_global(&event).await?;
        Ok(item)
    }

    /// Owner-only partial update: `None` keeps the current value.
    pub async fn update_item(
        &self,
        actor_id: Id,
        item_id: Id,
        name: Option<String>,
        description: Option<String>,
        available: Option<bool>,
    ) -> Result<Item, EngineError> {
        let _gate = self.commit_gate.read().await;
        self.resolve_user(actor_id)?;
        let state = self.get_item_state(item_id)?;
        let mut guard = self.lock_item(state, item_id).await?;
        ensure_can_update_item(&guard.item, actor_id)?;

        let name = name.unwrap_or_else(|| guard.item.name.clone());
        let description = description.unwrap_or_else(|| guard.item.description.clone());
        let available = available.unwrap_or(guard.item.available);
        validate_item_name(&name)?;
        validate_description(&description)?;

        let event = Event::ItemUpdated {
            id: item_id,
            name,
            description,
            available,
        };
        self.persist_item_event(&mut guard, &event).await?;
        Ok(guard.item.clone())
    }

    /// Owner-only. Bookings are never deleted, so an item that has any stays.
    pub async fn delete_item(&self, actor_id: Id, item_id: Id) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        self.resolve_user(actor_id)?;
        let state = self.get_item_state(item_id)?;
        let mut guard = self.lock_item(state, item_id).await?;
        ensure_can_update_item(&guard.item, actor_id)?;
        if !guard.bookings.is_empty() {
            return Err(EngineError::Referenced(EntityKind::Item, item_id));
        }

        let event = Event::ItemDeleted {
            id: item_id,
            owner_id: guard.item.owner_id,
            request_id: guard.item.request_id,
        };
        self.persist_global(&event).await?;
        guard.deleted = true;
        Ok(())
    }

    // ── Bookings ─────────────────────────────────────────────

    /// New bookings start `WAITING`. Overlap with other bookings is not checked.
    pub async fn create_booking(
        &self,
        requester_id: Id,
        item_id: Id,
        span: Span,
    ) -> Result<BookingView, EngineError> {
        let _gate = self.commit_gate.read().await;
        let booker = self.resolve_user(requester_id)?;
        validate_span(&span)?;
        let state = self.get_item_state(item_id)?;
        let mut guard = self.lock_item(state, item_id).await?;
        ensure_can_create_booking(&guard.item, requester_id)?;

        let id = self.store.next_id(EntityKind::Booking);
        let event = Event::BookingCreated {
            id,
            item_id,
            booker_id: requester_id,
            span,
            status: BookingStatus::Waiting,
        };
        self.persist_item_event(&mut guard, &event).await?;

        Ok(BookingView {
            id,
            start: span.start,
            end: span.end,
            status: BookingStatus::Waiting,
            item: guard.item.clone(),
            booker,
        })
    }

    /// Owner decides on a waiting booking. The status check runs before the
    /// ownership check, and the whole read-check-write happens under the
    /// item's write lock so two racing decisions cannot both succeed.
    pub async fn set_booking_approval(
        &self,
        actor_id: Id,
        booking_id: Id,
        approved: bool,
    ) -> Result<BookingView, EngineError> {
        let _gate = self.commit_gate.read().await;
        self.resolve_user(actor_id)?;
        let state = self.get_booking_item_state(booking_id)?;
        let mut guard = state.write().await;
        let booking = guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(EntityKind::Booking, booking_id))?;

        let status = decide(&booking, approved)?;
        ensure_can_change_status(&guard.item, actor_id)?;
        let booker = self
            .store
            .get_user(booking.booker_id)
            .ok_or(EngineError::NotFound(EntityKind::User, booking.booker_id))?;

        let event = Event::BookingStatusChanged {
            id: booking_id,
            item_id: booking.item_id,
            status,
        };
        self.persist_item_event(&mut guard, &event).await?;
        tracing::debug!("booking {booking_id} {}", status.as_str());

        Ok(BookingView {
            id: booking_id,
            start: booking.span.start,
            end: booking.span.end,
            status,
            item: guard.item.clone(),
            booker,
        })
    }

    // ── Comments ─────────────────────────────────────────────

    pub async fn add_comment(
        &self,
        author_id: Id,
        item_id: Id,
        text: String,
    ) -> Result<CommentView, EngineError> {
        let _gate = self.commit_gate.read().await;
        let author = self.resolve_user(author_id)?;
        validate_comment(&text)?;
        let state = self.get_item_state(item_id)?;
        let mut guard = self.lock_item(state, item_id).await?;

        let now = self.now();
        if !can_comment(author_id, item_id, &guard.bookings, now) {
            return Err(EngineError::CommentNotAllowed {
                user_id: author_id,
                item_id,
            });
        }

        let id = self.store.next_id(EntityKind::Comment);
        let event = Event::CommentAdded {
            id,
            item_id,
            author_id,
            text: text.clone(),
            created: now,
        };
        self.persist_item_event(&mut guard, &event).await?;

        Ok(CommentView {
            id,
            item_id,
            text,
            author_name: author.name,
            created: now,
        })
    }

    // ── Item requests ────────────────────────────────────────

    pub async fn create_request(
        &self,
        requester_id: Id,
        description: String,
    ) -> Result<RequestView, EngineError> {
        let _gate = self.commit_gate.read().await;
        self.resolve_user(requester_id)?;
        validate_description(&description)?;
        let id = self.store.next_id(EntityKind::Request);
        let created = self.now();
        let event = Event::RequestCreated {
            id,
            requester_id,
            description: description.clone(),
            created,
        };
        self.persist_global(&event).await?;

        Ok(RequestView {
            id,
            requester_id,
            description,
            created,
            items: Vec::new(),
        })
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    ///
    /// Holds the commit gate exclusively, so no mutation is mid-flight while the
    /// snapshot is taken and the file is swapped.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;
        let mut events = Vec::new();

        for kind in [
            EntityKind::User,
            EntityKind::Item,
            EntityKind::Booking,
            EntityKind::Comment,
            EntityKind::Request,
        ] {
            let last = self.store.last_id(kind);
            if last > 0 {
                events.push(Event::IdsReserved { kind, last });
            }
        }

        for user in self.store.list_users() {
            events.push(Event::UserCreated {
                id: user.id,
                name: user.name,
                email: user.email,
            });
        }
        for request in self.store.list_requests() {
            events.push(Event::RequestCreated {
                id: request.id,
                requester_id: request.requester_id,
                description: request.description,
                created: request.created,
            });
        }
        for item_id in self.store.item_ids() {
            let Some(state) = self.store.get_item(item_id) else {
                continue;
            };
            let guard = state.read().await;
            let item = &guard.item;
            events.push(Event::ItemCreated {
                id: item.id,
                owner_id: item.owner_id,
                name: item.name.clone(),
                description: item.description.clone(),
                available: item.available,
                request_id: item.request_id,
            });
            for b in &guard.bookings {
                events.push(Event::BookingCreated {
                    id: b.id,
                    item_id: b.item_id,
                    booker_id: b.booker_id,
                    span: b.span,
                    status: b.status,
                });
            }
            for c in &guard.comments {
                events.push(Event::CommentAdded {
                    id: c.id,
                    item_id: c.item_id,
                    author_id: c.author_id,
                    text: c.text.clone(),
                    created: c.created,
                });
            }
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        tracing::info!("WAL compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
