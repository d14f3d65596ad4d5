//! Free-tier quota periods and limit checks.
//!
//! Quota counters are keyed by `(device_id, ip_address, period_label)`.
//! A period is a calendar month in UTC, labelled `YYYY-MM`.

use crate::types::Timestamp;

/// Default number of free generations per device+IP per month.
pub const DEFAULT_FREE_GENERATIONS_PER_MONTH: i32 = 3;

/// Label of the quota period containing `at`.
pub fn period_label(at: Timestamp) -> String {
    at.format("%Y-%m").to_string()
}

/// Whether another free generation may be admitted.
///
/// `current` is `None` when no counter row exists yet for the period.
pub fn is_within_limit(current: Option<i32>, limit: i32) -> bool {
    current.unwrap_or(0) < limit
}

/// Free generations left in the period, never negative.
pub fn remaining(current: Option<i32>, limit: i32) -> i32 {
    (limit - current.unwrap_or(0)).max(0)
}
