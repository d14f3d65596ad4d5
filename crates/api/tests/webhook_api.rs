//! Provider notifications over HTTP.

mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};
use sqlx::PgPool;
use studio_core::notification::ProviderReport;
use studio_db::models::job::Job;
use studio_db::repositories::{CreditRepo, JobRepo};

use common::*;

const DEVICE: &str = "device-webhook";

async fn free_job(app: &TestApp) -> Job {
    let response = post_json(
        app.router.clone(),
        "/api/v1/generations/free",
        generation_body(Some(DEVICE)),
    )
    .await;
    assert_status(&response, StatusCode::ACCEPTED);
    let id = body_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    JobRepo::find_by_id(&app.state.pool, id).await.unwrap().unwrap()
}

async fn status_of(app: &TestApp, job: &Job) -> Value {
    let response = get(
        app.router.clone(),
        &format!("/api/v1/generations/{}?device_id={DEVICE}", job.id),
    )
    .await;
    assert_status(&response, StatusCode::OK);
    body_json(response).await["data"].clone()
}

fn completed(task: &str) -> Value {
    json!({ "id": task, "status": "completed", "outputs": [OUTPUT_URL] })
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn completion_notification_finishes_free_job(pool: PgPool) {
    let app = build_test_app(pool);
    let job = free_job(&app).await;

    let response = app
        .notify(completed(job.external_task_id.as_deref().unwrap()))
        .await;

    assert_status(&response, StatusCode::OK);
    assert_eq!(body_json(response).await["received"], true);

    let status = status_of(&app, &job).await;
    assert_eq!(status["status"], "completed");
    let output = status["output_image_url"].as_str().unwrap();
    assert_eq!(app.storage.get(output).unwrap(), [&b"WM:"[..], ARTIFACT].concat());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn failure_notification_records_provider_error(pool: PgPool) {
    let app = build_test_app(pool);
    let job = free_job(&app).await;

    app.notify(json!({
        "id": job.external_task_id,
        "status": "failed",
        "error": "content policy violation",
    }))
    .await;

    let status = status_of(&app, &job).await;
    assert_eq!(status["status"], "failed");
    assert_eq!(status["error_message"], "content policy violation");
    assert!(status["output_image_url"].is_null());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn malformed_notifications_are_acknowledged(pool: PgPool) {
    let app = build_test_app(pool);
    let job = free_job(&app).await;

    for body in [
        json!({ "status": "completed", "outputs": [OUTPUT_URL] }),
        json!({ "id": job.external_task_id }),
        json!({ "id": "", "status": "completed" }),
    ] {
        let response = app.notify(body).await;
        assert_status(&response, StatusCode::OK);
    }

    let response = post_raw(
        app.router.clone(),
        "/api/v1/webhooks/provider",
        b"{not json".to_vec(),
        &[],
    )
    .await;
    assert_status(&response, StatusCode::OK);
    app.state.reconciler.wait_idle().await;

    assert_eq!(status_of(&app, &job).await["status"], "processing");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_task_is_acknowledged(pool: PgPool) {
    let app = build_test_app(pool);

    let response = app.notify(completed("never-dispatched")).await;

    assert_status(&response, StatusCode::OK);
    assert!(app.storage.objects.lock().unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn duplicate_notifications_debit_once(pool: PgPool) {
    let app = build_test_app(pool);
    let (account_id, token) = app.account_with_credits(3).await;

    let response = post_json_auth(
        app.router.clone(),
        "/api/v1/generations/paid",
        generation_body(None),
        &token,
    )
    .await;
    let id = body_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    let job = JobRepo::find_by_id(&app.state.pool, id).await.unwrap().unwrap();
    let task = job.external_task_id.clone().unwrap();
    app.dispatcher
        .set_report(&task, ProviderReport::completed(vec![OUTPUT_URL.to_string()]));

    // Three deliveries in flight at once, then a late one.
    for _ in 0..3 {
        post_json(
            app.router.clone(),
            "/api/v1/webhooks/provider",
            completed(&task),
        )
        .await;
    }
    app.state.reconciler.wait_idle().await;
    app.notify(completed(&task)).await;

    assert_eq!(
        CreditRepo::balance(&app.state.pool, account_id).await.unwrap(),
        Some(2)
    );
    assert_eq!(
        CreditRepo::ledger_sum(&app.state.pool, account_id).await.unwrap(),
        2
    );
    assert_eq!(app.storage.objects.lock().unwrap().len(), 1);

    let response = get_auth(app.router.clone(), &format!("/api/v1/generations/{id}"), &token).await;
    let status = body_json(response).await;
    assert_eq!(status["data"]["status"], "completed");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn running_status_keeps_job_processing(pool: PgPool) {
    let app = build_test_app(pool);
    let job = free_job(&app).await;

    app.notify(json!({ "id": job.external_task_id, "status": "processing" }))
        .await;

    assert_eq!(status_of(&app, &job).await["status"], "processing");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unconfirmed_completion_is_not_applied(pool: PgPool) {
    let app = build_test_app(pool);
    let job = free_job(&app).await;

    let response = app
        .notify_unconfirmed(json!({
            "id": job.external_task_id,
            "status": "completed",
            "outputs": ["https://elsewhere.example.net/forged.jpg"],
        }))
        .await;

    assert_status(&response, StatusCode::OK);
    assert_eq!(status_of(&app, &job).await["status"], "processing");
    assert!(app.fetcher.urls.lock().unwrap().is_empty());
    assert!(app.storage.objects.lock().unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unconfirmed_failure_is_not_applied(pool: PgPool) {
    let app = build_test_app(pool);
    let job = free_job(&app).await;

    app.notify_unconfirmed(json!({
        "id": job.external_task_id,
        "status": "failed",
        "error": "forged",
    }))
    .await;

    let status = status_of(&app, &job).await;
    assert_eq!(status["status"], "processing");
    assert!(status["error_message"].is_null());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn artifact_comes_from_provider_report_not_notification(pool: PgPool) {
    let app = build_test_app(pool);
    let job = free_job(&app).await;
    let task = job.external_task_id.clone().unwrap();
    app.dispatcher
        .set_report(&task, ProviderReport::completed(vec![OUTPUT_URL.to_string()]));

    app.notify_unconfirmed(json!({
        "id": task,
        "status": "completed",
        "outputs": ["https://elsewhere.example.net/forged.jpg"],
    }))
    .await;

    assert_eq!(status_of(&app, &job).await["status"], "completed");
    assert_eq!(*app.fetcher.urls.lock().unwrap(), vec![OUTPUT_URL.to_string()]);
}
