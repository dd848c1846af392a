//! Hard input limits. Anything past these is rejected with `LimitExceeded`.

use crate::model::Ms;

const DAY_MS: Ms = 86_400_000;

/// 1970-01-01. Negative timestamps are rejected.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 2200-01-01.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

/// A single availability slot may cover at most one week.
pub const MAX_SPAN_DURATION_MS: Ms = 7 * DAY_MS;
/// Widest window accepted by range listings.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * DAY_MS;

pub const MAX_SLOTS_PER_INTERVIEWER: usize = 10_000;
pub const MAX_BULK_SLOTS: usize = 256;
pub const MAX_PANEL_SIZE: usize = 16;
pub const MAX_TECHNOLOGIES_PER_REQUEST: usize = 32;

pub const MAX_DESCRIPTION_LEN: usize = 500;
pub const MAX_CANDIDATE_NAME_LEN: usize = 200;
pub const MAX_NOTES_LEN: usize = 2000;
