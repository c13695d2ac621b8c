use tokio::sync::oneshot;

use crate::limits::*;
use crate::model::*;
use crate::observability::record_op;

use super::error::Entity;
use super::schedule::{has_finished_booking, now_ms, validate_window};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    pub async fn create_user(&self, name: String, email: String) -> Result<UserInfo, EngineError> {
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("name too long"));
        }
        if email.len() > MAX_EMAIL_LEN {
            return Err(EngineError::LimitExceeded("email too long"));
        }
        if self.store.user_id_by_email(&email).is_some() {
            return Err(EngineError::Conflict("email already exists"));
        }

        let id = self.store.user_seq.next();
        let event = Event::UserCreated {
            id,
            name: name.clone(),
            email: email.clone(),
        };
        self.persist_insert(&event).await?;
        record_op("create_user");
        Ok(UserInfo { id, name, email })
    }

    /// Patch a user. A changed email must not be claimed by another user.
    pub async fn update_user(
        &self,
        user_id: UserId,
        name: Option<String>,
        email: Option<String>,
    ) -> Result<UserInfo, EngineError> {
        if let Some(ref n) = name
            && n.len() > MAX_NAME_LEN
        {
            return Err(EngineError::LimitExceeded("name too long"));
        }
        if let Some(ref e) = email
            && e.len() > MAX_EMAIL_LEN
        {
            return Err(EngineError::LimitExceeded("email too long"));
        }
        let user = self
            .store
            .get_user(&user_id)
            .ok_or(EngineError::NotFound(Entity::User, user_id))?;
        let mut guard = user.write().await;
        if let Some(ref e) = email
            && let Some(existing) = self.store.user_id_by_email(e)
            && existing != user_id
        {
            return Err(EngineError::Conflict("email already exists"));
        }

        let event = Event::UserUpdated {
            id: user_id,
            name,
            email,
        };
        self.wal_append(&event).await?;
        self.store.apply_user_event(&mut guard, &event);
        record_op("update_user");
        Ok(UserInfo::from(&*guard))
    }

    /// Remove a user. Their items, bookings, and comments stay behind;
    /// nothing cascades.
    pub async fn delete_user(&self, user_id: UserId) -> Result<(), EngineError> {
        let user = self
            .store
            .get_user(&user_id)
            .ok_or(EngineError::NotFound(Entity::User, user_id))?;
        let email = user.read().await.email.clone();

        let event = Event::UserDeleted { id: user_id };
        self.wal_append(&event).await?;
        self.store.remove_user(&user_id, &email);
        record_op("delete_user");
        Ok(())
    }

    /// List an item for sharing. `request_id` links the item to the item
    /// request it answers.
    pub async fn create_item(
        &self,
        owner_id: UserId,
        name: String,
        description: String,
        available: bool,
        request_id: Option<RequestId>,
    ) -> Result<ItemInfo, EngineError> {
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("name too long"));
        }
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(EngineError::LimitExceeded("description too long"));
        }
        if !self.store.contains_user(&owner_id) {
            return Err(EngineError::NotFound(Entity::User, owner_id));
        }
        if let Some(rid) = request_id
            && !self.store.contains_request(&rid)
        {
            return Err(EngineError::NotFound(Entity::Request, rid));
        }

        let id = self.store.item_seq.next();
        let event = Event::ItemCreated {
            id,
            owner_id,
            name: name.clone(),
            description: description.clone(),
            available,
            request_id,
        };
        self.persist_insert(&event).await?;
        record_op("create_item");
        Ok(ItemInfo {
            id,
            owner_id,
            name,
            description,
            available,
            request_id,
        })
    }

    /// Patch an item. Only the owner may update; ownership never transfers.
    pub async fn update_item(
        &self,
        owner_id: UserId,
        item_id: ItemId,
        name: Option<String>,
        description: Option<String>,
        available: Option<bool>,
    ) -> Result<ItemInfo, EngineError> {
        if let Some(ref n) = name
            && n.len() > MAX_NAME_LEN
        {
            return Err(EngineError::LimitExceeded("name too long"));
        }
        if let Some(ref d) = description
            && d.len() > MAX_DESCRIPTION_LEN
        {
            return Err(EngineError::LimitExceeded("description too long"));
        }
        let item = self
            .store
            .get_item(&item_id)
            .ok_or(EngineError::NotFound(Entity::Item, item_id))?;
        let mut guard = item.write().await;
        if guard.owner_id != owner_id {
            return Err(EngineError::Forbidden("only the owner can update an item"));
        }

        let event = Event::ItemUpdated {
            id: item_id,
            name,
            description,
            available,
        };
        self.wal_append(&event).await?;
        self.store.apply_item_event(&mut guard, &event);
        record_op("update_item");
        Ok(ItemInfo::from(&*guard))
    }

    pub async fn create_request(
        &self,
        requester_id: UserId,
        description: String,
    ) -> Result<RequestInfo, EngineError> {
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(EngineError::LimitExceeded("description too long"));
        }
        if !self.store.contains_user(&requester_id) {
            return Err(EngineError::NotFound(Entity::User, requester_id));
        }

        let id = self.store.request_seq.next();
        let created = now_ms();
        let event = Event::RequestCreated {
            id,
            requester_id,
            description: description.clone(),
            created,
        };
        self.persist_insert(&event).await?;
        record_op("create_request");
        Ok(RequestInfo {
            id,
            requester_id,
            description,
            created,
        })
    }

    /// Request a time window on an item. Checks run in a fixed order: booker
    /// exists, item exists, booker is not the owner, item is available,
    /// window is valid. The new booking starts `Waiting`.
    ///
    /// Overlapping windows are allowed; competing requests are resolved by
    /// the owner at decision time.
    pub async fn create_booking(
        &self,
        booker_id: UserId,
        item_id: ItemId,
        start: Ms,
        end: Ms,
    ) -> Result<BookingInfo, EngineError> {
        if !self.store.contains_user(&booker_id) {
            return Err(EngineError::NotFound(Entity::User, booker_id));
        }
        let item = self
            .store
            .get_item(&item_id)
            .ok_or(EngineError::NotFound(Entity::Item, item_id))?;
        let guard = item.read().await;
        if guard.owner_id == booker_id {
            return Err(EngineError::Forbidden("owners cannot book their own items"));
        }
        if !guard.available {
            return Err(EngineError::Validation("item is not available for booking"));
        }
        let window = validate_window(start, end)?;

        let id = self.store.booking_seq.next();
        let event = Event::BookingCreated {
            id,
            item_id,
            booker_id,
            window,
        };
        self.persist_insert(&event).await?;
        record_op("create_booking");
        Ok(BookingInfo {
            id,
            item_id,
            booker_id,
            start: window.start,
            end: window.end,
            status: BookingStatus::Waiting,
        })
    }

    /// Approve or reject a waiting booking. Only the owner of the booked
    /// item may decide, and a booking is decided at most once: the status
    /// check and the transition happen under the booking row's write lock,
    /// held across the WAL append, so concurrent decisions cannot both
    /// succeed.
    pub async fn decide_booking(
        &self,
        owner_id: UserId,
        booking_id: BookingId,
        approve: bool,
    ) -> Result<BookingInfo, EngineError> {
        let booking = self
            .store
            .get_booking(&booking_id)
            .ok_or(EngineError::NotFound(Entity::Booking, booking_id))?;
        let mut guard = booking.write().await;

        let item = self
            .store
            .get_item(&guard.item_id)
            .ok_or(EngineError::NotFound(Entity::Item, guard.item_id))?;
        if item.read().await.owner_id != owner_id {
            return Err(EngineError::Forbidden(
                "only the item owner can decide a booking",
            ));
        }
        if guard.status != BookingStatus::Waiting {
            return Err(EngineError::Forbidden("booking already decided"));
        }

        let event = Event::BookingDecided {
            id: booking_id,
            approved: approve,
        };
        self.wal_append(&event).await?;
        self.store.apply_booking_event(&mut guard, &event);
        record_op("decide_booking");
        Ok(BookingInfo::from(&*guard))
    }

    /// Leave a comment on an item. Only users who actually held the item
    /// may comment: the author needs at least one booking of the item that
    /// ended before now, regardless of how that booking was decided.
    pub async fn add_comment(
        &self,
        author_id: UserId,
        item_id: ItemId,
        text: String,
    ) -> Result<CommentInfo, EngineError> {
        if text.len() > MAX_COMMENT_LEN {
            return Err(EngineError::LimitExceeded("comment too long"));
        }
        if !self.store.contains_user(&author_id) {
            return Err(EngineError::NotFound(Entity::User, author_id));
        }
        if !self.store.contains_item(&item_id) {
            return Err(EngineError::NotFound(Entity::Item, item_id));
        }

        let now = now_ms();
        let bookings = self
            .snapshot_bookings(&self.store.booking_ids_for_item(&item_id))
            .await;
        if !has_finished_booking(&bookings, author_id, now) {
            return Err(EngineError::Validation(
                "only users who held the item can comment",
            ));
        }

        let id = self.store.comment_seq.next();
        let event = Event::CommentAdded {
            id,
            item_id,
            author_id,
            text: text.clone(),
            created: now,
        };
        self.persist_insert(&event).await?;
        record_op("add_comment");
        Ok(CommentInfo {
            id,
            item_id,
            author_id,
            text,
            created: now,
        })
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state. Creation events carry current field
    /// values; decided bookings replay as a create followed by the decision.
    /// Rows are emitted in id order, so replay rebuilds the same index
    /// order the live store had.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let mut user_ids = self.store.user_ids();
        user_ids.sort_unstable();
        for id in user_ids {
            if let Some(user) = self.store.get_user(&id) {
                let guard = user.read().await;
                events.push(Event::UserCreated {
                    id: guard.id,
                    name: guard.name.clone(),
                    email: guard.email.clone(),
                });
            }
        }

        let mut requests = self.store.requests();
        requests.sort_unstable_by_key(|r| r.id);
        for r in requests {
            events.push(Event::RequestCreated {
                id: r.id,
                requester_id: r.requester_id,
                description: r.description,
                created: r.created,
            });
        }

        let mut item_ids = self.store.item_ids();
        item_ids.sort_unstable();
        for id in item_ids {
            if let Some(item) = self.store.get_item(&id) {
                let guard = item.read().await;
                events.push(Event::ItemCreated {
                    id: guard.id,
                    owner_id: guard.owner_id,
                    name: guard.name.clone(),
                    description: guard.description.clone(),
                    available: guard.available,
                    request_id: guard.request_id,
                });
            }
        }

        let mut booking_ids = self.store.booking_ids();
        booking_ids.sort_unstable();
        for id in booking_ids {
            if let Some(booking) = self.store.get_booking(&id) {
                let guard = booking.read().await;
                events.push(Event::BookingCreated {
                    id: guard.id,
                    item_id: guard.item_id,
                    booker_id: guard.booker_id,
                    window: guard.window,
                });
                if let Some(approved) = guard.status.decision() {
                    events.push(Event::BookingDecided {
                        id: guard.id,
                        approved,
                    });
                }
            }
        }

        let mut comments = self.store.comments();
        comments.sort_unstable_by_key(|c| c.id);
        for c in comments {
            events.push(Event::CommentAdded {
                id: c.id,
                item_id: c.item_id,
                author_id: c.author_id,
                text: c.text,
                created: c.created,
            });
        }

        tracing::info!("compacting WAL to {} events", events.len());
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Appends since the last compaction, for embedder-driven compaction
    /// policies. The engine never compacts on its own.
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
