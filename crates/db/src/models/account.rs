//! Registered account model.
//!
//! Accounts are created by the signup flow, which lives outside this
//! service; only the cached credit balance is maintained here.

use serde::Serialize;
use sqlx::FromRow;
use studio_core::types::{DbId, Timestamp};

/// A row from the `accounts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Account {
    pub id: DbId,
    pub email: String,
    /// Running total of `credit_ledger_entries.amount` for this account.
    pub credits_balance: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
