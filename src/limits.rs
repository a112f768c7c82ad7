use crate::model::{Minutes, MINUTES_PER_DAY};

/// Deferred requests held at once (waiting list + replanned area).
pub const MAX_WAITING: usize = 100_000;

pub const MAX_STAGE_NAME_LEN: usize = 64;
pub const MAX_PATIENT_TYPE_LEN: usize = 64;
pub const MAX_EXTRA_FIELDS: usize = 32;
pub const MAX_EXTRA_VALUE_LEN: usize = 1024;
pub const MAX_CALLBACK_URL_LEN: usize = 2048;

/// Longest single stage occupation accepted.
pub const MAX_DURATION_MINUTES: Minutes = 90 * MINUTES_PER_DAY;

/// Default simulation horizon: one year.
pub const DEFAULT_HORIZON_MINUTES: Minutes = 365 * MINUTES_PER_DAY;

/// Default bound on how far past its arrival the placement search may look.
pub const DEFAULT_SEARCH_WINDOW_MINUTES: Minutes = 14 * MINUTES_PER_DAY;
