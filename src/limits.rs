use crate::model::Ms;

pub const MAX_ITEM_NAME_LEN: usize = 50;
pub const MAX_DESCRIPTION_LEN: usize = 255;
pub const MAX_USER_NAME_LEN: usize = 255;
pub const MAX_EMAIL_LEN: usize = 512;
pub const MAX_COMMENT_LEN: usize = 2000;
pub const MAX_SEARCH_TEXT_LEN: usize = 255;

/// Longest accepted request line on the wire, in bytes.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
