//! Credit ledger entry model.

use serde::Serialize;
use sqlx::FromRow;
use studio_core::types::{DbId, Timestamp};

/// A row from the append-only `credit_ledger_entries` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CreditLedgerEntry {
    pub id: DbId,
    pub account_id: DbId,
    /// Signed change: positive for purchases, negative for generations.
    pub amount: i32,
    /// One of `purchase`, `generation`, `adjustment`.
    pub kind: String,
    #[serde(skip_serializing)]
    pub idempotency_key: String,
    pub created_at: Timestamp,
}
