//! Repository for the credit ledger (`credit_ledger_entries` + the cached
//! `accounts.credits_balance`).
//!
//! Every append is one statement: the entry insert and the balance update
//! share a CTE, so the cache can never drift from the ledger sum, and a
//! duplicate idempotency key inserts nothing and moves no balance.

use sqlx::PgExecutor;
use studio_core::credits::{self, LedgerKind, GENERATION_COST};
use studio_core::types::{DbId, JobId};

use crate::models::credit::CreditLedgerEntry;

/// Column list for `credit_ledger_entries` queries.
const COLUMNS: &str = "id, account_id, amount, kind, idempotency_key, created_at";

/// Provides the append-only credit ledger.
pub struct CreditRepo;

impl CreditRepo {
    /// Cached balance for an account, `None` if the account does not exist.
    pub async fn balance<'e, E>(executor: E, account_id: DbId) -> Result<Option<i32>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let row: Option<(i32,)> =
            sqlx::query_as("SELECT credits_balance FROM accounts WHERE id = $1")
                .bind(account_id)
                .fetch_optional(executor)
                .await?;
        Ok(row.map(|(balance,)| balance))
    }

    /// Sum of all ledger entries for an account. Always equals [`Self::balance`].
    pub async fn ledger_sum<'e, E>(executor: E, account_id: DbId) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (sum,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT \
             FROM credit_ledger_entries WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_one(executor)
        .await?;
        Ok(sum)
    }

    /// Debit one generation for a completed paid job.
    ///
    /// Returns `false` (and changes nothing) if this job was already debited.
    pub async fn debit_for_generation<'e, E>(
        executor: E,
        account_id: DbId,
        job_id: JobId,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        Self::append(
            executor,
            account_id,
            -GENERATION_COST,
            LedgerKind::Generation,
            &credits::generation_key(job_id),
        )
        .await
    }

    /// Credit a confirmed purchase.
    ///
    /// Returns `false` if this payment session was already credited.
    pub async fn credit_for_purchase<'e, E>(
        executor: E,
        account_id: DbId,
        session_id: &str,
        amount: i32,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        Self::append(
            executor,
            account_id,
            amount,
            LedgerKind::Purchase,
            &credits::purchase_key(session_id),
        )
        .await
    }

    /// Operator correction. `reference` identifies the adjustment uniquely.
    pub async fn adjust<'e, E>(
        executor: E,
        account_id: DbId,
        reference: &str,
        amount: i32,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        Self::append(
            executor,
            account_id,
            amount,
            LedgerKind::Adjustment,
            &credits::adjustment_key(reference),
        )
        .await
    }

    /// Entries for an account, newest first.
    pub async fn list_entries<'e, E>(
        executor: E,
        account_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CreditLedgerEntry>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM credit_ledger_entries \
             WHERE account_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, CreditLedgerEntry>(&query)
            .bind(account_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
    }

    /// Look up the entry guarded by an idempotency key.
    pub async fn find_by_key<'e, E>(
        executor: E,
        idempotency_key: &str,
    ) -> Result<Option<CreditLedgerEntry>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query =
            format!("SELECT {COLUMNS} FROM credit_ledger_entries WHERE idempotency_key = $1");
        sqlx::query_as::<_, CreditLedgerEntry>(&query)
            .bind(idempotency_key)
            .fetch_optional(executor)
            .await
    }

    /// Append an entry and move the cached balance by the same amount.
    ///
    /// Returns `true` if the entry was inserted. A missing account surfaces
    /// as a foreign-key violation.
    async fn append<'e, E>(
        executor: E,
        account_id: DbId,
        amount: i32,
        kind: LedgerKind,
        idempotency_key: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let row: Option<(i32,)> = sqlx::query_as(
            "WITH inserted AS ( \
                 INSERT INTO credit_ledger_entries (account_id, amount, kind, idempotency_key) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (idempotency_key) DO NOTHING \
                 RETURNING account_id, amount \
             ) \
             UPDATE accounts a \
             SET credits_balance = a.credits_balance + i.amount, updated_at = NOW() \
             FROM inserted i \
             WHERE a.id = i.account_id \
             RETURNING a.credits_balance",
        )
        .bind(account_id)
        .bind(amount)
        .bind(kind.as_str())
        .bind(idempotency_key)
        .fetch_optional(executor)
        .await?;

        match row {
            Some((new_balance,)) => {
                tracing::debug!(
                    account_id,
                    amount,
                    kind = kind.as_str(),
                    new_balance,
                    "Credit ledger entry appended",
                );
                Ok(true)
            }
            None => {
                tracing::debug!(
                    account_id,
                    kind = kind.as_str(),
                    idempotency_key,
                    "Credit ledger entry already exists, skipping",
                );
                Ok(false)
            }
        }
    }
}
