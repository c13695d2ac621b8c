use serde::{Deserialize, Serialize};

/// Unix milliseconds. The only time type.
pub type Ms = i64;

pub type UserId = u64;
pub type ItemId = u64;
pub type BookingId = u64;
pub type CommentId = u64;
pub type RequestId = u64;

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

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Lifecycle of a booking. Owner decisions move `Waiting` to `Approved` or
/// `Rejected` exactly once. `Canceled` is reserved for a booker-initiated
/// cancellation flow; no current operation produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Waiting,
    Approved,
    Rejected,
    Canceled,
}

impl BookingStatus {
    /// `Some(approved)` for decided bookings, `None` while waiting or canceled.
    pub fn decision(&self) -> Option<bool> {
        match self {
            BookingStatus::Approved => Some(true),
            BookingStatus::Rejected => Some(false),
            BookingStatus::Waiting | BookingStatus::Canceled => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

impl User {
    /// Patch semantics: `None` fields keep their current value.
    pub fn apply_patch(&mut self, name: Option<String>, email: Option<String>) {
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(email) = email {
            self.email = email;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    pub owner_id: UserId,
    pub name: String,
    pub description: String,
    pub available: bool,
    /// Set when the item was listed in answer to an item request.
    pub request_id: Option<RequestId>,
}

impl Item {
    pub fn apply_patch(
        &mut self,
        name: Option<String>,
        description: Option<String>,
        available: Option<bool>,
    ) {
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(description) = description {
            self.description = description;
        }
        if let Some(available) = available {
            self.available = available;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub id: BookingId,
    pub item_id: ItemId,
    pub booker_id: UserId,
    pub window: Span,
    pub status: BookingStatus,
}

impl Booking {
    pub fn decide(&mut self, approved: bool) {
        self.status = if approved {
            BookingStatus::Approved
        } else {
            BookingStatus::Rejected
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: CommentId,
    pub item_id: ItemId,
    pub author_id: UserId,
    pub text: String,
    pub created: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRequest {
    pub id: RequestId,
    pub requester_id: UserId,
    pub description: String,
    pub created: Ms,
}

/// Flat event records, one variant per state change. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UserCreated {
        id: UserId,
        name: String,
        email: String,
    },
    UserUpdated {
        id: UserId,
        name: Option<String>,
        email: Option<String>,
    },
    UserDeleted {
        id: UserId,
    },
    ItemCreated {
        id: ItemId,
        owner_id: UserId,
        name: String,
        description: String,
        available: bool,
        request_id: Option<RequestId>,
    },
    ItemUpdated {
        id: ItemId,
        name: Option<String>,
        description: Option<String>,
        available: Option<bool>,
    },
    RequestCreated {
        id: RequestId,
        requester_id: UserId,
        description: String,
        created: Ms,
    },
    BookingCreated {
        id: BookingId,
        item_id: ItemId,
        booker_id: UserId,
        window: Span,
    },
    BookingDecided {
        id: BookingId,
        approved: bool,
    },
    CommentAdded {
        id: CommentId,
        item_id: ItemId,
        author_id: UserId,
        text: String,
        created: Ms,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

impl From<&User> for UserInfo {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemInfo {
    pub id: ItemId,
    pub owner_id: UserId,
    pub name: String,
    pub description: String,
    pub available: bool,
    pub request_id: Option<RequestId>,
}

impl From<&Item> for ItemInfo {
    fn from(i: &Item) -> Self {
        Self {
            id: i.id,
            owner_id: i.owner_id,
            name: i.name.clone(),
            description: i.description.clone(),
            available: i.available,
            request_id: i.request_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInfo {
    pub id: BookingId,
    pub item_id: ItemId,
    pub booker_id: UserId,
    pub start: Ms,
    pub end: Ms,
    pub status: BookingStatus,
}

impl From<&Booking> for BookingInfo {
    fn from(b: &Booking) -> Self {
        Self {
            id: b.id,
            item_id: b.item_id,
            booker_id: b.booker_id,
            start: b.window.start,
            end: b.window.end,
            status: b.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentInfo {
    pub id: CommentId,
    pub item_id: ItemId,
    pub author_id: UserId,
    pub text: String,
    pub created: Ms,
}

impl From<&Comment> for CommentInfo {
    fn from(c: &Comment) -> Self {
        Self {
            id: c.id,
            item_id: c.item_id,
            author_id: c.author_id,
            text: c.text.clone(),
            created: c.created,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub id: RequestId,
    pub requester_id: UserId,
    pub description: String,
    pub created: Ms,
}

impl From<&ItemRequest> for RequestInfo {
    fn from(r: &ItemRequest) -> Self {
        Self {
            id: r.id,
            requester_id: r.requester_id,
            description: r.description.clone(),
            created: r.created,
        }
    }
}

/// An item together with its booking outlook and comments.
/// `last_booking`/`next_booking` are populated only for the owner's view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDetail {
    pub item: ItemInfo,
    pub last_booking: Option<BookingInfo>,
    pub next_booking: Option<BookingInfo>,
    pub comments: Vec<CommentInfo>,
}

/// An item request together with the items listed in answer to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDetail {
    pub request: RequestInfo,
    pub items: Vec<ItemInfo>,
}
