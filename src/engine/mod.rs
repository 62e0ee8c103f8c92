mod aggregate;
mod eligibility;
mod error;
mod guard;
mod lifecycle;
mod mutations;
mod queries;
mod store;

pub use aggregate::{build_item_view, last_booking, next_booking};
pub use eligibility::can_comment;
pub use error::{BookingDenial, EngineError};
pub use guard::{
    booking_denial, can_change_status, can_create_booking, can_update_item, can_view_booking,
};
pub use lifecycle::{decide, select_bookings};
pub use store::{InMemoryStore, SharedItemState, Store};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};

use crate::clock::{SharedClock, now_ms};
use crate::model::*;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders with the shared outcome.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush what we have before touching the file any other way
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
    tracing::debug!("WAL writer stopped: all senders dropped");
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush of {} events failed: {e}", batch.len());
    }
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so partial bytes don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: &mut Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

/// The booking engine: every operation on users, items, bookings, comments
/// and requests. Durable through the WAL, concurrent through per-item locks.
pub struct Engine {
    pub(super) store: Arc<dyn Store>,
    pub(super) clock: SharedClock,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold this shared for their whole duration and resolve their
    /// acting user only after acquiring it. Compaction and user deletion take
    /// it exclusively. Always acquired first.
    pub(super) commit_gate: RwLock<()>,
    /// Serialises user creation and updates across WAL append and apply, so
    /// the live order of user events is the logged order.
    /// Acquired after the commit gate.
    pub(super) user_gate: Mutex<()>,
}

/// Apply an item-scoped event. Caller holds the item's write lock.
fn apply_to_item(state: &mut ItemState, event: &Event, store: &dyn Store) {
    match event {
        Event::ItemUpdated {
            name,
            description,
            available,
            ..
        } => {
            state.item.name = name.clone();
            state.item.description = description.clone();
            state.item.available = *available;
        }
        Event::BookingCreated {
            id,
            item_id,
            booker_id,
            span,
            status,
        } => {
            state.insert_booking(Booking {
                id: *id,
                item_id: *item_id,
                booker_id: *booker_id,
                span: *span,
                status: *status,
            });
            store.index_booking(*id, *item_id, *booker_id);
        }
        Event::BookingStatusChanged { id, status, .. } => {
            if let Some(booking) = state.booking_mut(*id) {
                booking.status = *status;
            }
        }
        Event::CommentAdded {
            id,
            item_id,
            author_id,
            text,
            created,
        } => {
            state.comments.push(Comment {
                id: *id,
                item_id: *item_id,
                author_id: *author_id,
                text: text.clone(),
                created: *created,
            });
            store.index_comment(*id, *author_id);
        }
        // Not item-scoped: handled by apply_global
        Event::UserCreated { .. }
        | Event::UserUpdated { .. }
        | Event::UserDeleted { .. }
        | Event::ItemCreated { .. }
        | Event::ItemDeleted { .. }
        | Event::RequestCreated { .. }
        | Event::IdsReserved { .. } => {}
    }
}

/// Apply an event that lives outside any item lock.
fn apply_global(store: &dyn Store, event: &Event) {
    match event {
        Event::UserCreated { id, name, email } => {
            store.claim_email(email, *id);
            store.put_user(User {
                id: *id,
                name: name.clone(),
                email: email.clone(),
            });
        }
        Event::UserUpdated { id, name, email } => {
            store.claim_email(email, *id);
            if let Some(old) = store.get_user(*id)
                && old.email != *email
            {
                store.release_email(&old.email, *id);
            }
            store.put_user(User {
                id: *id,
                name: name.clone(),
                email: email.clone(),
            });
        }
        Event::UserDeleted { id } => {
            store.remove_user(*id);
        }
        Event::ItemCreated {
            id,
            owner_id,
            name,
            description,
            available,
            request_id,
        } => {
            store.insert_item(Item {
                id: *id,
                owner_id: *owner_id,
                name: name.clone(),
                description: description.clone(),
                available: *available,
                request_id: *request_id,
            });
        }
        Event::ItemDeleted {
            id,
            owner_id,
            request_id,
        } => store.remove_item(*id, *owner_id, *request_id),
        Event::RequestCreated {
            id,
            requester_id,
            description,
            created,
        } => store.put_request(ItemRequest {
            id: *id,
            requester_id: *requester_id,
            description: description.clone(),
            created: *created,
        }),
        // Counter recovery happens in Engine::open via allocated_id
        Event::IdsReserved { .. } => {}
        // Item-scoped: handled by apply_to_item under the item lock
        Event::ItemUpdated { .. }
        | Event::BookingCreated { .. }
        | Event::BookingStatusChanged { .. }
        | Event::CommentAdded { .. } => {}
    }
}

impl Engine {
    /// Replay the log at `wal_path` into `store` and start the WAL writer.
    pub fn open(
        wal_path: PathBuf,
        store: Arc<dyn Store>,
        clock: SharedClock,
    ) -> io::Result<Self> {
        let replay = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        // Nobody else holds these item locks yet, so try_write never contends.
        // Never block here: this may run inside an async context.
        for event in &replay.events {
            if let Some((kind, id)) = event.allocated_id() {
                store.observe_id(kind, id);
            }
            match event.item_id() {
                Some(item_id) => {
                    let Some(state) = store.get_item(item_id) else {
                        tracing::warn!("replay: event for unknown item {item_id} skipped");
                        continue;
                    };
                    match state.try_write() {
                        Ok(mut guard) => apply_to_item(&mut guard, event, store.as_ref()),
                        Err(_) => tracing::warn!("replay: item {item_id} locked, event skipped"),
                    }
                }
                None => apply_global(store.as_ref(), event),
            }
        }
        tracing::info!(
            "replayed {} events from {}",
            replay.events.len(),
            wal_path.display()
        );

        Ok(Self {
            store,
            clock,
            wal_tx,
            commit_gate: RwLock::new(()),
            user_gate: Mutex::new(()),
        })
    }

    pub(super) fn now(&self) -> Ms {
        now_ms(self.clock.as_ref())
    }

    /// Identity gate: every operation resolves its acting user through here first.
    pub fn resolve_user(&self, user_id: Id) -> Result<User, EngineError> {
        self.store
            .get_user(user_id)
            .ok_or(EngineError::NotFound(EntityKind::User, user_id))
    }

    pub(super) fn get_item_state(&self, item_id: Id) -> Result<SharedItemState, EngineError> {
        self.store
            .get_item(item_id)
            .ok_or(EngineError::NotFound(EntityKind::Item, item_id))
    }

    /// Write-lock an item's state. A handle cloned before a concurrent delete
    /// committed reads as `NotFound` once the lock is ours.
    pub(super) async fn lock_item(
        &self,
        state: SharedItemState,
        item_id: Id,
    ) -> Result<OwnedRwLockWriteGuard<ItemState>, EngineError> {
        let guard = state.write_owned().await;
        if guard.deleted {
            return Err(EngineError::NotFound(EntityKind::Item, item_id));
        }
        Ok(guard)
    }

    /// Booking id → owning item's shared state.
    pub(super) fn get_booking_item_state(
        &self,
        booking_id: Id,
    ) -> Result<SharedItemState, EngineError> {
        let item_id = self
            .store
            .item_for_booking(booking_id)
            .ok_or(EngineError::NotFound(EntityKind::Booking, booking_id))?;
        self.store
            .get_item(item_id)
            .ok_or(EngineError::NotFound(EntityKind::Booking, booking_id))
    }

    /// Display name for a comment author; deleted authors degrade to an empty name.
    pub(super) fn author_name(&self, user_id: Id) -> String {
        self.store
            .get_user(user_id)
            .map(|u| u.name)
            .unwrap_or_default()
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append then apply to the locked item. Nothing is applied if the append fails.
    pub(super) async fn persist_item_event(
        &self,
        state: &mut ItemState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_item(state, event, self.store.as_ref());
        Ok(())
    }

    /// WAL-append then apply an event that has no item lock scope.
    pub(super) async fn persist_global(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_global(self.store.as_ref(), event);
        Ok(())
    }
}
