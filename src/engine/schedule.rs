use crate::limits::*;
use crate::model::*;

use super::EngineError;

// ── Temporal logic ────────────────────────────────────────────────

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// Validate a raw booking window and return it as a `Span`.
/// An inverted or empty window is a validation failure; out-of-range
/// timestamps and oversized windows hit the hard limits.
pub(crate) fn validate_window(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if end <= start {
        return Err(EngineError::Validation("booking end must be after start"));
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    let window = Span::new(start, end);
    if window.duration_ms() > MAX_WINDOW_DURATION_MS {
        return Err(EngineError::LimitExceeded("booking window too wide"));
    }
    Ok(window)
}

/// Time/status buckets for booking listings.
///
/// The time buckets classify by window against a single `now` instant:
/// `Current` means `start <= now < end`, `Past` means `end < now`, `Future`
/// means `start > now`. A booking whose window ends exactly at `now` is in
/// no time bucket except `All`. Time buckets ignore status; the status
/// buckets ignore time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingBucket {
    All,
    Current,
    Past,
    Future,
    Waiting,
    Rejected,
}

pub fn bucket_matches(bucket: BookingBucket, booking: &Booking, now: Ms) -> bool {
    match bucket {
        BookingBucket::All => true,
        BookingBucket::Current => booking.window.contains_instant(now),
        BookingBucket::Past => booking.window.end < now,
        BookingBucket::Future => booking.window.start > now,
        BookingBucket::Waiting => booking.status == BookingStatus::Waiting,
        BookingBucket::Rejected => booking.status == BookingStatus::Rejected,
    }
}

/// The approved booking that finished most recently: max `end` with `end < now`.
pub fn last_booking(bookings: &[Booking], now: Ms) -> Option<&Booking> {
    bookings
        .iter()
        .filter(|b| b.status == BookingStatus::Approved && b.window.end < now)
        .max_by_key(|b| b.window.end)
}

/// The next upcoming approved booking: min `start` with `start > now`.
/// A currently running booking is neither last nor next.
pub fn next_booking(bookings: &[Booking], now: Ms) -> Option<&Booking> {
    bookings
        .iter()
        .filter(|b| b.status == BookingStatus::Approved && b.window.start > now)
        .min_by_key(|b| b.window.start)
}

/// Whether `user_id` has at least one finished booking among `bookings`.
/// Finished means `end < now`; the booking's status does not matter, so a
/// rejected-but-elapsed booking still counts.
pub fn has_finished_booking(bookings: &[Booking], user_id: UserId, now: Ms) -> bool {
    bookings
        .iter()
        .any(|b| b.booker_id == user_id && b.window.end < now)
}
