#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::PgPool;
use studio_api::auth::jwt::{generate_access_token, JwtConfig};
use studio_api::config::{ProviderConfig, ServerConfig, StorageConfig};
use studio_api::middleware::rate_limit::RateLimitConfig;
use studio_api::router::build_app_router;
use studio_api::state::{AppState, Collaborators};
use studio_core::generation::EditParameters;
use studio_core::notification::{parse_notification, ProviderReport};
use studio_core::types::DbId;
use studio_db::repositories::{AccountRepo, CreditRepo};
use studio_pipeline::fetch::{ArtifactFetcher, FetchError};
use studio_pipeline::storage::{ArtifactStorage, StorageError};
use studio_pipeline::watermark::{WatermarkError, Watermarker};
use studio_pipeline::PipelineConfig;
use studio_provider::{DispatchError, TaskDispatcher};
use tower::ServiceExt;

pub const PAYMENT_SECRET: &str = "whsec_test_secret";
pub const OUTPUT_URL: &str = "https://provider.example.com/outputs/result.jpg";
pub const ARTIFACT: &[u8] = b"provider jpeg bytes";

// ---------------------------------------------------------------------------
// Fake collaborators
// ---------------------------------------------------------------------------

/// Sequential task ids. Polls answer from `reports`, and report a task
/// with no entry as still running.
#[derive(Default)]
pub struct FakeDispatcher {
    pub reject_submit: Mutex<bool>,
    pub submissions: Mutex<Vec<(String, EditParameters, String)>>,
    pub reports: Mutex<HashMap<String, ProviderReport>>,
    next_id: AtomicUsize,
}

impl FakeDispatcher {
    /// Set what the provider says about `task` from now on.
    pub fn set_report(&self, task: &str, report: ProviderReport) {
        self.reports.lock().unwrap().insert(task.to_string(), report);
    }
}

#[async_trait]
impl TaskDispatcher for FakeDispatcher {
    async fn submit(
        &self,
        input_ref: &str,
        params: &EditParameters,
        callback_url: &str,
    ) -> Result<String, DispatchError> {
        if *self.reject_submit.lock().unwrap() {
            return Err(DispatchError::Rejected {
                status: 500,
                body: "provider overloaded".into(),
            });
        }
        self.submissions.lock().unwrap().push((
            input_ref.to_string(),
            params.clone(),
            callback_url.to_string(),
        ));
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("task-{n}"))
    }

    async fn poll(&self, external_task_id: &str) -> Result<ProviderReport, DispatchError> {
        Ok(self
            .reports
            .lock()
            .unwrap()
            .get(external_task_id)
            .cloned()
            .unwrap_or_else(|| ProviderReport::from_parts("processing", None, None)))
    }
}

/// Serves [`ARTIFACT`] for any URL and records what was asked for.
#[derive(Default)]
pub struct FakeFetcher {
    pub urls: Mutex<Vec<String>>,
}

#[async_trait]
impl ArtifactFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(ARTIFACT.to_vec())
    }
}

pub struct FakeWatermarker;

impl Watermarker for FakeWatermarker {
    fn apply(&self, bytes: &[u8]) -> Result<Vec<u8>, WatermarkError> {
        let mut out = b"WM:".to_vec();
        out.extend_from_slice(bytes);
        Ok(out)
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    next: AtomicUsize,
}

impl MemoryStorage {
    pub fn get(&self, output_ref: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(output_ref).cloned()
    }
}

#[async_trait]
impl ArtifactStorage for MemoryStorage {
    async fn store(&self, bytes: Vec<u8>, ext: &str) -> Result<String, StorageError> {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        let output_ref = format!("/storage/{n}.{ext}");
        self.objects.lock().unwrap().insert(output_ref.clone(), bytes);
        Ok(output_ref)
    }

    async fn delete(&self, output_ref: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(output_ref);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// Test configuration. The poll fallback is pushed far out so that only
/// explicit notifications resolve jobs.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 15,
        },
        pipeline: PipelineConfig {
            public_base_url: Some("https://studio.example.com".to_string()),
            poll_after: Duration::from_secs(3600),
            ..PipelineConfig::default()
        },
        provider: ProviderConfig {
            base_url: "https://provider.invalid/api/v3".to_string(),
            api_key: "test-key".to_string(),
            model: "vendor/edit".to_string(),
        },
        storage: StorageConfig::S3 {
            bucket: "unused".to_string(),
            region: "us-east-1".to_string(),
        },
        reconcile_concurrency: 2,
        max_artifact_bytes: 1024 * 1024,
        payment_webhook_secret: Some(PAYMENT_SECRET.to_string()),
        free_rate_limit: RateLimitConfig::per_minute(5),
        paid_rate_limit: RateLimitConfig::per_minute(10),
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub dispatcher: Arc<FakeDispatcher>,
    pub fetcher: Arc<FakeFetcher>,
    pub storage: Arc<MemoryStorage>,
}

pub fn build_test_app(pool: PgPool) -> TestApp {
    build_test_app_with(pool, test_config())
}

/// Build the full application router, with the same middleware stack as
/// production, around fake collaborators.
pub fn build_test_app_with(pool: PgPool, config: ServerConfig) -> TestApp {
    let dispatcher = Arc::new(FakeDispatcher::default());
    let fetcher = Arc::new(FakeFetcher::default());
    let storage = Arc::new(MemoryStorage::default());

    let state = AppState::new(
        pool,
        config,
        Collaborators {
            dispatcher: dispatcher.clone(),
            fetcher: fetcher.clone(),
            watermarker: Arc::new(FakeWatermarker),
            storage: storage.clone(),
        },
    );

    TestApp {
        router: build_app_router(state.clone()),
        state,
        dispatcher,
        fetcher,
        storage,
    }
}

impl TestApp {
    pub fn token_for(&self, account_id: DbId) -> String {
        generate_access_token(account_id, &self.state.config.jwt).unwrap()
    }

    /// A fresh account holding `balance` credits, with a token for it.
    pub async fn account_with_credits(&self, balance: i32) -> (DbId, String) {
        let email = format!("{}@example.com", uuid::Uuid::new_v4());
        let account = AccountRepo::create(&self.state.pool, &email).await.unwrap();
        if balance > 0 {
            CreditRepo::credit_for_purchase(
                &self.state.pool,
                account.id,
                &format!("cs_seed_{}", account.id),
                balance,
            )
            .await
            .unwrap();
        }
        (account.id, self.token_for(account.id))
    }

    /// Deliver a provider notification the provider will confirm, and wait
    /// until it has been applied.
    pub async fn notify(&self, body: Value) -> Response<Body> {
        if let Ok((task, report)) = parse_notification(body.to_string().as_bytes()) {
            self.dispatcher.set_report(&task, report);
        }
        self.notify_unconfirmed(body).await
    }

    /// Deliver a notification without touching what the provider reports.
    pub async fn notify_unconfirmed(&self, body: Value) -> Response<Body> {
        let response = post_json(self.router.clone(), "/api/v1/webhooks/provider", body).await;
        self.state.reconciler.wait_idle().await;
        response
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    get_with(app, uri, &[]).await
}

pub async fn get_with(app: Router, uri: &str, headers: &[(&str, &str)]) -> Response<Body> {
    let mut builder = Request::get(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::get(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    post_json_with(app, uri, body, &[]).await
}

pub async fn post_json_auth(app: Router, uri: &str, body: Value, token: &str) -> Response<Body> {
    let auth = format!("Bearer {token}");
    post_json_with(app, uri, body, &[("authorization", auth.as_str())]).await
}

pub async fn post_json_with(
    app: Router,
    uri: &str,
    body: Value,
    headers: &[(&str, &str)],
) -> Response<Body> {
    post_raw(app, uri, body.to_string().into_bytes(), headers).await
}

pub async fn post_raw(
    app: Router,
    uri: &str,
    body: Vec<u8>,
    headers: &[(&str, &str)],
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    send(app, builder.body(Body::from(body)).unwrap()).await
}

pub fn generation_body(device_id: Option<&str>) -> Value {
    let mut body = serde_json::json!({
        "prompt": "make it look like a watercolor",
        "image_url": "https://cdn.example.com/uploads/photo.png",
        "aspect_ratio": "4:5",
        "resolution": "4k",
    });
    if let Some(device_id) = device_id {
        body["device_id"] = Value::from(device_id);
    }
    body
}

pub fn assert_status(response: &Response<Body>, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status");
}
