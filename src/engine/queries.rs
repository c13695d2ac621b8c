use std::collections::HashMap;

use crate::limits::*;
use crate::model::*;

use super::error::Entity;
use super::schedule::{bucket_matches, last_booking, next_booking, now_ms, BookingBucket};
use super::{Engine, EngineError};

/// Whose bookings a listing returns: those placed by a user, or those on
/// items a user owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingScope {
    Booker(UserId),
    Owner(UserId),
}

impl BookingScope {
    fn user_id(&self) -> UserId {
        match self {
            BookingScope::Booker(id) | BookingScope::Owner(id) => *id,
        }
    }
}

impl Engine {
    pub async fn get_user(&self, user_id: UserId) -> Result<UserInfo, EngineError> {
        let user = self
            .store
            .get_user(&user_id)
            .ok_or(EngineError::NotFound(Entity::User, user_id))?;
        let guard = user.read().await;
        Ok(UserInfo::from(&*guard))
    }

    pub async fn list_users(&self) -> Vec<UserInfo> {
        let mut ids = self.store.user_ids();
        ids.sort_unstable();
        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(user) = self.store.get_user(&id) {
                users.push(UserInfo::from(&*user.read().await));
            }
        }
        users
    }

    /// Fetch a single booking. Visible only to its booker and to the owner
    /// of the booked item.
    pub async fn get_booking(
        &self,
        user_id: UserId,
        booking_id: BookingId,
    ) -> Result<BookingInfo, EngineError> {
        let booking = self
            .store
            .get_booking(&booking_id)
            .ok_or(EngineError::NotFound(Entity::Booking, booking_id))?;
        let row = booking.read().await.clone();
        if row.booker_id != user_id {
            let item = self
                .store
                .get_item(&row.item_id)
                .ok_or(EngineError::NotFound(Entity::Item, row.item_id))?;
            if item.read().await.owner_id != user_id {
                return Err(EngineError::Forbidden(
                    "booking is visible only to the booker and the owner",
                ));
            }
        }
        Ok(BookingInfo::from(&row))
    }

    /// List bookings in `scope` filtered to `bucket`, newest start first;
    /// equal starts keep creation order.
    ///
    /// `now` is captured once per call, so a window straddling the call
    /// instant lands in exactly one time bucket. Paging returns page number
    /// `from / size` of length `size`; a `from` that is not a multiple of
    /// `size` addresses the containing page, not an offset.
    pub async fn list_bookings(
        &self,
        scope: BookingScope,
        bucket: BookingBucket,
        from: usize,
        size: usize,
    ) -> Result<Vec<BookingInfo>, EngineError> {
        if size == 0 {
            return Err(EngineError::Validation("page size must be positive"));
        }
        if size > MAX_PAGE_SIZE {
            return Err(EngineError::LimitExceeded("page size too large"));
        }
        let user_id = scope.user_id();
        if !self.store.contains_user(&user_id) {
            return Err(EngineError::NotFound(Entity::User, user_id));
        }

        let ids = match scope {
            BookingScope::Booker(id) => self.store.booking_ids_for_booker(&id),
            BookingScope::Owner(id) => {
                let mut ids = Vec::new();
                for item_id in self.store.item_ids_for_owner(&id) {
                    ids.extend(self.store.booking_ids_for_item(&item_id));
                }
                ids
            }
        };

        let now = now_ms();
        let mut rows = self.snapshot_bookings(&ids).await;
        rows.retain(|b| bucket_matches(bucket, b, now));
        rows.sort_by(|a, b| b.window.start.cmp(&a.window.start));

        let page = from / size;
        Ok(rows
            .iter()
            .skip(page * size)
            .take(size)
            .map(BookingInfo::from)
            .collect())
    }

    /// Bookings placed by `user_id`.
    pub async fn list_for_booker(
        &self,
        user_id: UserId,
        bucket: BookingBucket,
        from: usize,
        size: usize,
    ) -> Result<Vec<BookingInfo>, EngineError> {
        self.list_bookings(BookingScope::Booker(user_id), bucket, from, size)
            .await
    }

    /// Bookings on items owned by `user_id`.
    pub async fn list_for_owner(
        &self,
        user_id: UserId,
        bucket: BookingBucket,
        from: usize,
        size: usize,
    ) -> Result<Vec<BookingInfo>, EngineError> {
        self.list_bookings(BookingScope::Owner(user_id), bucket, from, size)
            .await
    }

    /// Item view for `viewer_id`. The booking outlook (`last_booking`,
    /// `next_booking`) is owner-only; everyone else gets the item and its
    /// comments. The viewer itself is not looked up.
    pub async fn item_detail(
        &self,
        viewer_id: UserId,
        item_id: ItemId,
    ) -> Result<ItemDetail, EngineError> {
        let item = self
            .store
            .get_item(&item_id)
            .ok_or(EngineError::NotFound(Entity::Item, item_id))?;
        let item_info = ItemInfo::from(&*item.read().await);

        let now = now_ms();
        let (last, next) = if item_info.owner_id == viewer_id {
            let rows = self
                .snapshot_bookings(&self.store.booking_ids_for_item(&item_id))
                .await;
            (
                last_booking(&rows, now).map(BookingInfo::from),
                next_booking(&rows, now).map(BookingInfo::from),
            )
        } else {
            (None, None)
        };

        Ok(ItemDetail {
            item: item_info,
            last_booking: last,
            next_booking: next,
            comments: self.comments_for_item(&item_id),
        })
    }

    /// All of an owner's items with their booking outlook and comments,
    /// item id ascending. Bookings and comments are fetched once for the
    /// whole listing and grouped by item id; adding items does not add
    /// per-item lookups to the hot part.
    pub async fn owner_items_detail(
        &self,
        owner_id: UserId,
    ) -> Result<Vec<ItemDetail>, EngineError> {
        if !self.store.contains_user(&owner_id) {
            return Err(EngineError::NotFound(Entity::User, owner_id));
        }

        let mut item_ids = self.store.item_ids_for_owner(&owner_id);
        item_ids.sort_unstable();

        let mut all_booking_ids = Vec::new();
        for item_id in &item_ids {
            all_booking_ids.extend(self.store.booking_ids_for_item(item_id));
        }
        let mut bookings_by_item: HashMap<ItemId, Vec<Booking>> = HashMap::new();
        for row in self.snapshot_bookings(&all_booking_ids).await {
            bookings_by_item.entry(row.item_id).or_default().push(row);
        }

        let now = now_ms();
        let mut details = Vec::with_capacity(item_ids.len());
        for item_id in item_ids {
            let Some(item) = self.store.get_item(&item_id) else {
                continue;
            };
            let item_info = ItemInfo::from(&*item.read().await);
            let bookings = bookings_by_item
                .get(&item_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            details.push(ItemDetail {
                item: item_info,
                last_booking: last_booking(bookings, now).map(BookingInfo::from),
                next_booking: next_booking(bookings, now).map(BookingInfo::from),
                comments: self.comments_for_item(&item_id),
            });
        }
        Ok(details)
    }

    /// Case-insensitive substring search over name and description of
    /// available items. Blank text short-circuits to an empty result
    /// without touching the tables.
    pub async fn search_items(&self, text: &str) -> Vec<ItemInfo> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let needle = text.to_lowercase();
        let mut ids = self.store.item_ids();
        ids.sort_unstable();
        let mut found = Vec::new();
        for id in ids {
            if let Some(item) = self.store.get_item(&id) {
                let guard = item.read().await;
                if guard.available
                    && (guard.name.to_lowercase().contains(&needle)
                        || guard.description.to_lowercase().contains(&needle))
                {
                    found.push(ItemInfo::from(&*guard));
                }
            }
        }
        found
    }

    /// The caller's own item requests, newest first, each with the items
    /// listed in answer to it.
    pub async fn my_requests(
        &self,
        requester_id: UserId,
    ) -> Result<Vec<RequestDetail>, EngineError> {
        if !self.store.contains_user(&requester_id) {
            return Err(EngineError::NotFound(Entity::User, requester_id));
        }
        let requests = self
            .store
            .requests()
            .into_iter()
            .filter(|r| r.requester_id == requester_id)
            .collect();
        Ok(self.assemble_request_details(requests).await)
    }

    /// Item requests from other users, newest first. The browse view for
    /// owners looking for something to list.
    pub async fn all_requests(&self, user_id: UserId) -> Result<Vec<RequestDetail>, EngineError> {
        if !self.store.contains_user(&user_id) {
            return Err(EngineError::NotFound(Entity::User, user_id));
        }
        let requests = self
            .store
            .requests()
            .into_iter()
            .filter(|r| r.requester_id != user_id)
            .collect();
        Ok(self.assemble_request_details(requests).await)
    }

    pub async fn get_request(
        &self,
        user_id: UserId,
        request_id: RequestId,
    ) -> Result<RequestDetail, EngineError> {
        if !self.store.contains_user(&user_id) {
            return Err(EngineError::NotFound(Entity::User, user_id));
        }
        let request = self
            .store
            .get_request(&request_id)
            .ok_or(EngineError::NotFound(Entity::Request, request_id))?;
        Ok(self.request_detail(request).await)
    }

    // ── Shared assembly helpers ──────────────────────────────

    /// Clone booking rows out of their locks so filtering and sorting run
    /// on a consistent snapshot.
    pub(super) async fn snapshot_bookings(&self, ids: &[BookingId]) -> Vec<Booking> {
        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(booking) = self.store.get_booking(id) {
                rows.push(booking.read().await.clone());
            }
        }
        rows
    }

    fn comments_for_item(&self, item_id: &ItemId) -> Vec<CommentInfo> {
        let mut comments: Vec<Comment> = self
            .store
            .comment_ids_for_item(item_id)
            .iter()
            .filter_map(|id| self.store.get_comment(id))
            .collect();
        comments.sort_by_key(|c| (c.created, c.id));
        comments.iter().map(CommentInfo::from).collect()
    }

    async fn assemble_request_details(&self, mut requests: Vec<ItemRequest>) -> Vec<RequestDetail> {
        requests.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        let mut details = Vec::with_capacity(requests.len());
        for request in requests {
            details.push(self.request_detail(request).await);
        }
        details
    }

    async fn request_detail(&self, request: ItemRequest) -> RequestDetail {
        let mut item_ids = self.store.item_ids_for_request(&request.id);
        item_ids.sort_unstable();
        let mut items = Vec::with_capacity(item_ids.len());
        for id in item_ids {
            if let Some(item) = self.store.get_item(&id) {
                items.push(ItemInfo::from(&*item.read().await));
            }
        }
        RequestDetail {
            request: RequestInfo::from(&request),
            items,
        }
    }
}
