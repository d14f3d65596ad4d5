//! Integration tests for generation job persistence and state transitions.

use sqlx::PgPool;
use studio_core::generation::EditParameters;
use studio_db::models::job::{CreateJob, JobOwner};
use studio_db::models::status::JobStatus;
use studio_db::repositories::{AccountRepo, JobRepo};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn anonymous_job(device: &str) -> CreateJob {
    CreateJob {
        owner: JobOwner::Anonymous {
            device_id: device.to_string(),
            ip_address: "203.0.113.7".to_string(),
        },
        input_ref: "https://cdn.example.com/in.png".to_string(),
        params: EditParameters::new("make it brighter", None, None),
        model_name: "test/model".to_string(),
    }
}

fn paid_job(account_id: i64) -> CreateJob {
    CreateJob {
        owner: JobOwner::RegisteredUser(account_id),
        ..anonymous_job("unused")
    }
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_anonymous_job_is_pending_and_free(pool: PgPool) {
    let job = JobRepo::create(&pool, &anonymous_job("dev-1")).await.unwrap();

    assert_eq!(job.status(), Some(JobStatus::Pending));
    assert!(job.is_free);
    assert_eq!(job.account_id, None);
    assert_eq!(job.device_id.as_deref(), Some("dev-1"));
    assert_eq!(job.resolution, "8k");
    assert_eq!(job.aspect_ratio, "1:1");
    assert!(job.external_task_id.is_none());
    assert!(job.completed_at.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_paid_job_is_not_free(pool: PgPool) {
    let account = AccountRepo::create(&pool, "a@example.com").await.unwrap();
    let job = JobRepo::create(&pool, &paid_job(account.id)).await.unwrap();

    assert!(!job.is_free);
    assert_eq!(job.owner(), Some(JobOwner::RegisteredUser(account.id)));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn mixed_owner_row_is_rejected(pool: PgPool) {
    let account = AccountRepo::create(&pool, "a@example.com").await.unwrap();
    let job = JobRepo::create(&pool, &paid_job(account.id)).await.unwrap();

    let result = sqlx::query("UPDATE generation_jobs SET device_id = 'dev' WHERE id = $1")
        .bind(job.id)
        .execute(&pool)
        .await;
    assert!(result.is_err(), "owner check constraint should reject");
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn full_happy_path(pool: PgPool) {
    let job = JobRepo::create(&pool, &anonymous_job("dev-1")).await.unwrap();

    let processing = JobRepo::mark_processing(&pool, job.id, "task-1")
        .await
        .unwrap()
        .expect("pending job should move to processing");
    assert_eq!(processing.status(), Some(JobStatus::Processing));
    assert_eq!(processing.external_task_id.as_deref(), Some("task-1"));

    let found = JobRepo::find_by_external_task_id(&pool, "task-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, job.id);

    let completed = JobRepo::complete(&pool, job.id, "/storage/out.jpg")
        .await
        .unwrap()
        .expect("processing job should complete");
    assert_eq!(completed.status(), Some(JobStatus::Completed));
    assert_eq!(completed.output_ref.as_deref(), Some("/storage/out.jpg"));
    assert!(completed.completed_at.is_some());
    assert!(completed.error_message.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn pending_job_cannot_complete(pool: PgPool) {
    let job = JobRepo::create(&pool, &anonymous_job("dev-1")).await.unwrap();

    let result = JobRepo::complete(&pool, job.id, "/storage/out.jpg").await.unwrap();
    assert!(result.is_none());

    let reloaded = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status(), Some(JobStatus::Pending));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn pending_job_can_fail_directly(pool: PgPool) {
    let job = JobRepo::create(&pool, &anonymous_job("dev-1")).await.unwrap();

    let failed = JobRepo::fail(&pool, job.id, "dispatch rejected")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.status(), Some(JobStatus::Failed));
    assert_eq!(failed.error_message.as_deref(), Some("dispatch rejected"));
    assert!(failed.output_ref.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn terminal_state_is_never_overwritten(pool: PgPool) {
    let job = JobRepo::create(&pool, &anonymous_job("dev-1")).await.unwrap();
    JobRepo::mark_processing(&pool, job.id, "task-1").await.unwrap().unwrap();
    JobRepo::complete(&pool, job.id, "/storage/out.jpg").await.unwrap().unwrap();

    assert!(JobRepo::fail(&pool, job.id, "late failure").await.unwrap().is_none());
    assert!(JobRepo::complete(&pool, job.id, "/storage/other.jpg")
        .await
        .unwrap()
        .is_none());
    assert!(JobRepo::mark_processing(&pool, job.id, "task-2")
        .await
        .unwrap()
        .is_none());

    let reloaded = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status(), Some(JobStatus::Completed));
    assert_eq!(reloaded.output_ref.as_deref(), Some("/storage/out.jpg"));
    assert_eq!(reloaded.external_task_id.as_deref(), Some("task-1"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_terminal_writes_have_one_winner(pool: PgPool) {
    let job = JobRepo::create(&pool, &anonymous_job("dev-1")).await.unwrap();
    JobRepo::mark_processing(&pool, job.id, "task-1").await.unwrap().unwrap();

    let (a, b) = tokio::join!(
        JobRepo::complete(&pool, job.id, "/storage/out.jpg"),
        JobRepo::fail(&pool, job.id, "timeout"),
    );
    let winners = [a.unwrap().is_some(), b.unwrap().is_some()];
    assert_eq!(winners.iter().filter(|w| **w).count(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn external_task_id_is_unique(pool: PgPool) {
    let a = JobRepo::create(&pool, &anonymous_job("dev-1")).await.unwrap();
    let b = JobRepo::create(&pool, &anonymous_job("dev-2")).await.unwrap();
    JobRepo::mark_processing(&pool, a.id, "task-1").await.unwrap().unwrap();

    let err = JobRepo::mark_processing(&pool, b.id, "task-1").await.unwrap_err();
    let db_err = err.as_database_error().expect("should be a database error");
    assert_eq!(db_err.code().as_deref(), Some("23505"));
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_by_account_is_scoped_and_newest_first(pool: PgPool) {
    let alice = AccountRepo::create(&pool, "alice@example.com").await.unwrap();
    let bob = AccountRepo::create(&pool, "bob@example.com").await.unwrap();

    let first = JobRepo::create(&pool, &paid_job(alice.id)).await.unwrap();
    let second = JobRepo::create(&pool, &paid_job(alice.id)).await.unwrap();
    JobRepo::create(&pool, &paid_job(bob.id)).await.unwrap();
    JobRepo::create(&pool, &anonymous_job("dev-1")).await.unwrap();

    let jobs = JobRepo::list_by_account(&pool, alice.id, 10, 0).await.unwrap();
    let ids: Vec<_> = jobs.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
    assert_eq!(JobRepo::count_by_account(&pool, alice.id).await.unwrap(), 2);

    let page = JobRepo::list_by_account(&pool, alice.id, 1, 1).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, first.id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_processing_returns_only_in_flight(pool: PgPool) {
    let pending = JobRepo::create(&pool, &anonymous_job("dev-1")).await.unwrap();
    let running = JobRepo::create(&pool, &anonymous_job("dev-2")).await.unwrap();
    let done = JobRepo::create(&pool, &anonymous_job("dev-3")).await.unwrap();
    JobRepo::mark_processing(&pool, running.id, "task-r").await.unwrap();
    JobRepo::mark_processing(&pool, done.id, "task-d").await.unwrap();
    JobRepo::complete(&pool, done.id, "/storage/d.jpg").await.unwrap();

    let jobs = JobRepo::list_processing(&pool, 100).await.unwrap();
    let ids: Vec<_> = jobs.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![running.id]);
    assert!(!ids.contains(&pending.id));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn count_active_free_ignores_terminal_and_other_devices(pool: PgPool) {
    let pending = JobRepo::create(&pool, &anonymous_job("dev-1")).await.unwrap();
    let running = JobRepo::create(&pool, &anonymous_job("dev-1")).await.unwrap();
    let failed = JobRepo::create(&pool, &anonymous_job("dev-1")).await.unwrap();
    JobRepo::create(&pool, &anonymous_job("dev-2")).await.unwrap();
    JobRepo::mark_processing(&pool, running.id, "task-r").await.unwrap();
    JobRepo::fail(&pool, failed.id, "dispatch failed").await.unwrap();

    let count = JobRepo::count_active_free(&pool, "dev-1", "203.0.113.7")
        .await
        .unwrap();
    assert_eq!(count, 2);
    assert!(pending.is_free);

    let other_ip = JobRepo::count_active_free(&pool, "dev-1", "198.51.100.1")
        .await
        .unwrap();
    assert_eq!(other_ip, 0);
}
