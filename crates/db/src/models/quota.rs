//! Free-tier quota counter model.

use serde::Serialize;
use sqlx::FromRow;
use studio_core::types::{DbId, Timestamp};

/// A row from the `quota_counters` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuotaCounter {
    pub id: DbId,
    pub device_id: String,
    pub ip_address: String,
    pub period_label: String,
    pub count: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Result of an admission-time quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaCheck {
    pub allowed: bool,
    pub current_count: i32,
}
