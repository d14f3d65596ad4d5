//! Repository for the `quota_counters` table.
//!
//! `check` and `commit` are deliberately separate: admission checks, and
//! only a successfully completed free job commits. Two concurrent
//! admissions at the limit boundary can both pass `check`.

use sqlx::PgExecutor;

use crate::models::quota::{QuotaCheck, QuotaCounter};

/// Column list for `quota_counters` queries.
const COLUMNS: &str =
    "id, device_id, ip_address, period_label, count, created_at, updated_at";

/// Provides the free-tier quota ledger.
pub struct QuotaRepo;

impl QuotaRepo {
    /// Find the counter for a device+IP in a period.
    pub async fn find<'e, E>(
        executor: E,
        device_id: &str,
        ip_address: &str,
        period_label: &str,
    ) -> Result<Option<QuotaCounter>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM quota_counters \
             WHERE device_id = $1 AND ip_address = $2 AND period_label = $3"
        );
        sqlx::query_as::<_, QuotaCounter>(&query)
            .bind(device_id)
            .bind(ip_address)
            .bind(period_label)
            .fetch_optional(executor)
            .await
    }

    /// Whether another free generation may be admitted this period.
    pub async fn check<'e, E>(
        executor: E,
        device_id: &str,
        ip_address: &str,
        period_label: &str,
        limit: i32,
    ) -> Result<QuotaCheck, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let current = Self::find(executor, device_id, ip_address, period_label)
            .await?
            .map(|c| c.count);

        Ok(QuotaCheck {
            allowed: studio_core::quota::is_within_limit(current, limit),
            current_count: current.unwrap_or(0),
        })
    }

    /// Record one consumed free generation, creating the counter at 1.
    ///
    /// Returns the new count. Single-statement upsert, so concurrent commits
    /// for the same key never lose an increment.
    pub async fn commit<'e, E>(
        executor: E,
        device_id: &str,
        ip_address: &str,
        period_label: &str,
    ) -> Result<i32, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (count,): (i32,) = sqlx::query_as(
            "INSERT INTO quota_counters (device_id, ip_address, period_label, count) \
             VALUES ($1, $2, $3, 1) \
             ON CONFLICT (device_id, ip_address, period_label) \
             DO UPDATE SET count = quota_counters.count + 1, updated_at = NOW() \
             RETURNING count",
        )
        .bind(device_id)
        .bind(ip_address)
        .bind(period_label)
        .fetch_one(executor)
        .await?;
        Ok(count)
    }
}
