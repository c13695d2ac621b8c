use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::model::*;

pub type SharedUser = Arc<RwLock<User>>;
pub type SharedItem = Arc<RwLock<Item>>;
pub type SharedBooking = Arc<RwLock<Booking>>;

/// Monotonic id allocator starting at 1. Replay feeds historical ids through
/// `observe` so fresh allocations continue past the highest id seen.
pub struct IdSeq(AtomicU64);

impl IdSeq {
    fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    fn observe(&self, id: u64) {
        self.0.fetch_max(id + 1, Ordering::Relaxed);
    }
}

/// All engine state: entity tables plus the secondary indexes derived from
/// them. Mutable entities (users, items, bookings) live behind row locks;
/// comments and requests are immutable once created and stored by value.
pub struct EntityStore {
    users: DashMap<UserId, SharedUser>,
    items: DashMap<ItemId, SharedItem>,
    bookings: DashMap<BookingId, SharedBooking>,
    comments: DashMap<CommentId, Comment>,
    requests: DashMap<RequestId, ItemRequest>,

    /// email → user id, for uniqueness checks.
    emails: DashMap<String, UserId>,
    items_by_owner: DashMap<UserId, Vec<ItemId>>,
    items_by_request: DashMap<RequestId, Vec<ItemId>>,
    bookings_by_item: DashMap<ItemId, Vec<BookingId>>,
    bookings_by_booker: DashMap<UserId, Vec<BookingId>>,
    comments_by_item: DashMap<ItemId, Vec<CommentId>>,

    pub user_seq: IdSeq,
    pub item_seq: IdSeq,
    pub booking_seq: IdSeq,
    pub comment_seq: IdSeq,
    pub request_seq: IdSeq,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            items: DashMap::new(),
            bookings: DashMap::new(),
            comments: DashMap::new(),
            requests: DashMap::new(),
            emails: DashMap::new(),
            items_by_owner: DashMap::new(),
            items_by_request: DashMap::new(),
            bookings_by_item: DashMap::new(),
            bookings_by_booker: DashMap::new(),
            comments_by_item: DashMap::new(),
            user_seq: IdSeq::new(),
            item_seq: IdSeq::new(),
            booking_seq: IdSeq::new(),
            comment_seq: IdSeq::new(),
            request_seq: IdSeq::new(),
        }
    }

    // ── Users ────────────────────────────────────────────────

    pub fn contains_user(&self, id: &UserId) -> bool {
        self.users.contains_key(id)
    }

    pub fn get_user(&self, id: &UserId) -> Option<SharedUser> {
        self.users.get(id).map(|e| e.value().clone())
    }

    pub fn user_ids(&self) -> Vec<UserId> {
        self.users.iter().map(|e| *e.key()).collect()
    }

    pub fn user_id_by_email(&self, email: &str) -> Option<UserId> {
        self.emails.get(email).map(|e| *e.value())
    }

    /// Remove the user row and its email index entry. The caller supplies
    /// the email read from the row before deciding to delete.
    pub fn remove_user(&self, id: &UserId, email: &str) {
        self.users.remove(id);
        self.emails.remove(email);
    }

    // ── Items ────────────────────────────────────────────────

    pub fn contains_item(&self, id: &ItemId) -> bool {
        self.items.contains_key(id)
    }

    pub fn get_item(&self, id: &ItemId) -> Option<SharedItem> {
        self.items.get(id).map(|e| e.value().clone())
    }

    pub fn item_ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|e| *e.key()).collect()
    }

    pub fn item_ids_for_owner(&self, owner_id: &UserId) -> Vec<ItemId> {
        self.items_by_owner
            .get(owner_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn item_ids_for_request(&self, request_id: &RequestId) -> Vec<ItemId> {
        self.items_by_request
            .get(request_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    // ── Bookings ─────────────────────────────────────────────

    pub fn get_booking(&self, id: &BookingId) -> Option<SharedBooking> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    pub fn booking_ids(&self) -> Vec<BookingId> {
        self.bookings.iter().map(|e| *e.key()).collect()
    }

    pub fn booking_ids_for_item(&self, item_id: &ItemId) -> Vec<BookingId> {
        self.bookings_by_item
            .get(item_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn booking_ids_for_booker(&self, booker_id: &UserId) -> Vec<BookingId> {
        self.bookings_by_booker
            .get(booker_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    // ── Comments ─────────────────────────────────────────────

    pub fn get_comment(&self, id: &CommentId) -> Option<Comment> {
        self.comments.get(id).map(|e| e.value().clone())
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.comments.iter().map(|e| e.value().clone()).collect()
    }

    pub fn comment_ids_for_item(&self, item_id: &ItemId) -> Vec<CommentId> {
        self.comments_by_item
            .get(item_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    // ── Item requests ────────────────────────────────────────

    pub fn contains_request(&self, id: &RequestId) -> bool {
        self.requests.contains_key(id)
    }

    pub fn get_request(&self, id: &RequestId) -> Option<ItemRequest> {
        self.requests.get(id).map(|e| e.value().clone())
    }

    pub fn requests(&self) -> Vec<ItemRequest> {
        self.requests.iter().map(|e| e.value().clone()).collect()
    }

    // ── Event application ────────────────────────────────────

    /// Insert rows for creation events and maintain the secondary indexes.
    /// Patch events (`UserUpdated`, `ItemUpdated`, `BookingDecided`) are
    /// applied under the caller's row lock via the `apply_*_event` methods;
    /// `UserDeleted` goes through `remove_user` at the map level.
    pub fn apply(&self, event: &Event) {
        match event {
            Event::UserCreated { id, name, email } => {
                self.user_seq.observe(*id);
                self.emails.insert(email.clone(), *id);
                self.users.insert(
                    *id,
                    Arc::new(RwLock::new(User {
                        id: *id,
                        name: name.clone(),
                        email: email.clone(),
                    })),
                );
            }
            Event::ItemCreated {
                id,
                owner_id,
                name,
                description,
                available,
                request_id,
            } => {
                self.item_seq.observe(*id);
                self.items_by_owner.entry(*owner_id).or_default().push(*id);
                if let Some(rid) = request_id {
                    self.items_by_request.entry(*rid).or_default().push(*id);
                }
                self.items.insert(
                    *id,
                    Arc::new(RwLock::new(Item {
                        id: *id,
                        owner_id: *owner_id,
                        name: name.clone(),
                        description: description.clone(),
                        available: *available,
                        request_id: *request_id,
                    })),
                );
            }
            Event::RequestCreated {
                id,
                requester_id,
                description,
                created,
            } => {
                self.request_seq.observe(*id);
                self.requests.insert(
                    *id,
                    ItemRequest {
                        id: *id,
                        requester_id: *requester_id,
                        description: description.clone(),
                        created: *created,
                    },
                );
            }
            Event::BookingCreated {
                id,
                item_id,
                booker_id,
                window,
            } => {
                self.booking_seq.observe(*id);
                self.bookings_by_item.entry(*item_id).or_default().push(*id);
                self.bookings_by_booker
                    .entry(*booker_id)
                    .or_default()
                    .push(*id);
                self.bookings.insert(
                    *id,
                    Arc::new(RwLock::new(Booking {
                        id: *id,
                        item_id: *item_id,
                        booker_id: *booker_id,
                        window: *window,
                        status: BookingStatus::Waiting,
                    })),
                );
            }
            Event::CommentAdded {
                id,
                item_id,
                author_id,
                text,
                created,
            } => {
                self.comment_seq.observe(*id);
                self.comments_by_item.entry(*item_id).or_default().push(*id);
                self.comments.insert(
                    *id,
                    Comment {
                        id: *id,
                        item_id: *item_id,
                        author_id: *author_id,
                        text: text.clone(),
                        created: *created,
                    },
                );
            }
            Event::UserUpdated { .. }
            | Event::UserDeleted { .. }
            | Event::ItemUpdated { .. }
            | Event::BookingDecided { .. } => {}
        }
    }

    /// Apply a user patch under the caller's write lock, keeping the email
    /// index in step with the row.
    pub fn apply_user_event(&self, user: &mut User, event: &Event) {
        if let Event::UserUpdated { name, email, .. } = event {
            if let Some(new_email) = email
                && *new_email != user.email
            {
                self.emails.remove(&user.email);
                self.emails.insert(new_email.clone(), user.id);
            }
            user.apply_patch(name.clone(), email.clone());
        }
    }

    /// Apply an item patch under the caller's write lock.
    pub fn apply_item_event(&self, item: &mut Item, event: &Event) {
        if let Event::ItemUpdated {
            name,
            description,
            available,
            ..
        } = event
        {
            item.apply_patch(name.clone(), description.clone(), *available);
        }
    }

    /// Apply an owner decision under the caller's write lock.
    pub fn apply_booking_event(&self, booking: &mut Booking, event: &Event) {
        if let Event::BookingDecided { approved, .. } = event {
            booking.decide(*approved);
        }
    }
}
