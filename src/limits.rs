//! Hard caps on engine inputs. Every limit maps to a `LimitExceeded` error.

use crate::model::Ms;

/// Max length of a user or item name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Max length of an email address, in bytes.
pub const MAX_EMAIL_LEN: usize = 320;

/// Max length of an item or request description, in bytes.
pub const MAX_DESCRIPTION_LEN: usize = 4_000;

/// Max length of a comment, in bytes.
pub const MAX_COMMENT_LEN: usize = 4_000;

/// Earliest accepted timestamp (the unix epoch).
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;

/// Latest accepted timestamp (2100-01-01T00:00:00Z).
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// Max booking window width (366 days).
pub const MAX_WINDOW_DURATION_MS: Ms = 366 * 24 * 3_600_000;

/// Max page size for booking listings.
pub const MAX_PAGE_SIZE: usize = 1_000;
