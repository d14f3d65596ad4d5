//! Repository for the `generation_jobs` table.
//!
//! Every state change is a conditional update on the current status, so
//! concurrent writers (webhook, poll fallback, dispatcher) are linearized by
//! Postgres: exactly one terminal write can succeed per job. A method that
//! loses the race returns `None` and writes nothing.

use sqlx::PgExecutor;
use studio_core::types::{DbId, JobId};

use crate::models::job::{CreateJob, Job, JobOwner};
use crate::models::status::{JobStatus, ACTIVE_STATUSES};

/// Column list for `generation_jobs` queries.
const COLUMNS: &str = "\
    id, account_id, device_id, ip_address, external_task_id, status_id, \
    input_ref, output_ref, prompt, model_name, resolution, aspect_ratio, \
    is_free, error_message, created_at, updated_at, completed_at";

/// Provides persistence and state transitions for generation jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new pending job with a fresh UUID v7 id.
    pub async fn create<'e, E>(executor: E, input: &CreateJob) -> Result<Job, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (account_id, device_id, ip_address) = match &input.owner {
            JobOwner::RegisteredUser(account_id) => (Some(*account_id), None, None),
            JobOwner::Anonymous {
                device_id,
                ip_address,
            } => (None, Some(device_id.as_str()), Some(ip_address.as_str())),
        };

        let query = format!(
            "INSERT INTO generation_jobs \
                 (id, account_id, device_id, ip_address, status_id, input_ref, \
                  prompt, model_name, resolution, aspect_ratio, is_free) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(uuid::Uuid::now_v7())
            .bind(account_id)
            .bind(device_id)
            .bind(ip_address)
            .bind(JobStatus::Pending.id())
            .bind(&input.input_ref)
            .bind(&input.params.prompt)
            .bind(&input.model_name)
            .bind(&input.params.resolution)
            .bind(&input.params.aspect_ratio)
            .bind(input.is_free())
            .fetch_one(executor)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id<'e, E>(executor: E, id: JobId) -> Result<Option<Job>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {COLUMNS} FROM generation_jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Find a job by the provider-assigned task id.
    pub async fn find_by_external_task_id<'e, E>(
        executor: E,
        external_task_id: &str,
    ) -> Result<Option<Job>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {COLUMNS} FROM generation_jobs WHERE external_task_id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(external_task_id)
            .fetch_optional(executor)
            .await
    }

    /// `Pending -> Processing`, recording the provider task id in the same write.
    pub async fn mark_processing<'e, E>(
        executor: E,
        id: JobId,
        external_task_id: &str,
    ) -> Result<Option<Job>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE generation_jobs \
             SET status_id = $2, external_task_id = $3, updated_at = NOW() \
             WHERE id = $1 AND status_id = $4 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .bind(JobStatus::Processing.id())
            .bind(external_task_id)
            .bind(JobStatus::Pending.id())
            .fetch_optional(executor)
            .await
    }

    /// Non-terminal -> `Completed` with the permanent output reference.
    ///
    /// Only a job that already holds a provider task id can complete, so in
    /// practice this is `Processing -> Completed`. Returns `None` if the job
    /// reached a terminal state first.
    pub async fn complete<'e, E>(
        executor: E,
        id: JobId,
        output_ref: &str,
    ) -> Result<Option<Job>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE generation_jobs \
             SET status_id = $2, output_ref = $3, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($4, $5) AND external_task_id IS NOT NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .bind(JobStatus::Completed.id())
            .bind(output_ref)
            .bind(ACTIVE_STATUSES[0])
            .bind(ACTIVE_STATUSES[1])
            .fetch_optional(executor)
            .await
    }

    /// `Pending | Processing -> Failed` with a human-readable reason.
    ///
    /// Returns `None` if the job already reached a terminal state.
    pub async fn fail<'e, E>(
        executor: E,
        id: JobId,
        error: &str,
    ) -> Result<Option<Job>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE generation_jobs \
             SET status_id = $2, error_message = $3, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .bind(JobStatus::Failed.id())
            .bind(error)
            .bind(ACTIVE_STATUSES[0])
            .bind(ACTIVE_STATUSES[1])
            .fetch_optional(executor)
            .await
    }

    /// List an account's jobs, newest first.
    pub async fn list_by_account<'e, E>(
        executor: E,
        account_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM generation_jobs \
             WHERE account_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(account_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
    }

    /// Total number of jobs owned by an account.
    pub async fn count_by_account<'e, E>(executor: E, account_id: DbId) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM generation_jobs WHERE account_id = $1")
                .bind(account_id)
                .fetch_one(executor)
                .await?;
        Ok(count)
    }

    /// Free jobs for a device+IP that have not reached a terminal state.
    pub async fn count_active_free<'e, E>(
        executor: E,
        device_id: &str,
        ip_address: &str,
    ) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM generation_jobs \
             WHERE device_id = $1 AND ip_address = $2 AND status_id IN ($3, $4)",
        )
        .bind(device_id)
        .bind(ip_address)
        .bind(ACTIVE_STATUSES[0])
        .bind(ACTIVE_STATUSES[1])
        .fetch_one(executor)
        .await?;
        Ok(count)
    }

    /// Processing jobs, oldest first. Used at startup to re-arm polling for
    /// work dispatched before a restart.
    pub async fn list_processing<'e, E>(executor: E, limit: i64) -> Result<Vec<Job>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM generation_jobs \
             WHERE status_id = $1 \
             ORDER BY created_at ASC \
             LIMIT $2"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Processing.id())
            .bind(limit)
            .fetch_all(executor)
            .await
    }
}
