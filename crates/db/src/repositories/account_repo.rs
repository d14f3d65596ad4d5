//! Repository for the `accounts` table.

use sqlx::PgExecutor;
use studio_core::types::DbId;

use crate::models::account::Account;

/// Column list for `accounts` queries.
const COLUMNS: &str = "id, email, credits_balance, created_at, updated_at";

/// Provides the minimal account operations this service needs.
pub struct AccountRepo;

impl AccountRepo {
    /// Insert an account with a zero balance.
    pub async fn create<'e, E>(executor: E, email: &str) -> Result<Account, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("INSERT INTO accounts (email) VALUES ($1) RETURNING {COLUMNS}");
        sqlx::query_as::<_, Account>(&query)
            .bind(email)
            .fetch_one(executor)
            .await
    }

    /// Find an account by its ID.
    pub async fn find_by_id<'e, E>(executor: E, id: DbId) -> Result<Option<Account>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {COLUMNS} FROM accounts WHERE id = $1");
        sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }
}
