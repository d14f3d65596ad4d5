use std::time::Duration;

use studio_core::generation::DEFAULT_MODEL;
use studio_core::quota::DEFAULT_FREE_GENERATIONS_PER_MONTH;
use studio_pipeline::config::{
    DEFAULT_POLL_AFTER, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_MAX_ATTEMPTS,
};
use studio_pipeline::fetch::DEFAULT_MAX_ARTIFACT_BYTES;
use studio_pipeline::PipelineConfig;

use crate::auth::jwt::JwtConfig;
use crate::middleware::rate_limit::{RateLimitConfig, DEFAULT_MAX_TRACKED_CLIENTS};

/// Default number of provider notifications resolved concurrently.
pub const DEFAULT_RECONCILE_CONCURRENCY: usize = 8;

/// Default free generation requests per client address per window.
pub const DEFAULT_FREE_RATE_LIMIT: u32 = 5;

/// Default paid generation requests per client address per window.
pub const DEFAULT_PAID_RATE_LIMIT: u32 = 10;

/// Server configuration loaded from environment variables.
///
/// All fields except the secrets have defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for in-flight reconciliation (default: `30`).
    pub shutdown_timeout_secs: u64,
    pub jwt: JwtConfig,
    pub pipeline: PipelineConfig,
    pub provider: ProviderConfig,
    pub storage: StorageConfig,
    /// Maximum concurrent notification resolutions.
    pub reconcile_concurrency: usize,
    /// Largest provider artifact accepted, in bytes.
    pub max_artifact_bytes: usize,
    /// Shared secret for payment confirmations. The payment webhook answers
    /// 503 while unset.
    pub payment_webhook_secret: Option<String>,
    /// Per-address throttle on `POST /generations/free`.
    pub free_rate_limit: RateLimitConfig,
    /// Per-address throttle on `POST /generations/paid`.
    pub paid_rate_limit: RateLimitConfig,
}

/// Compute provider connection settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// Where generated artifacts are written.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Local { path: String, public_prefix: String },
    S3 { bucket: String, region: String },
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                 |
    /// |------------------------------|-------------------------|
    /// | `HOST`                       | `0.0.0.0`               |
    /// | `PORT`                       | `3000`                  |
    /// | `CORS_ORIGINS`               | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`      | `30`                    |
    /// | `PUBLIC_BASE_URL`            | unset                   |
    /// | `FREE_GENERATIONS_PER_MONTH` | `3`                     |
    /// | `POLL_AFTER_SECS`            | `60`                    |
    /// | `POLL_INTERVAL_SECS`         | `5`                     |
    /// | `POLL_MAX_ATTEMPTS`          | `60`                    |
    /// | `RECONCILE_CONCURRENCY`      | `8`                     |
    /// | `MAX_ARTIFACT_BYTES`         | `52428800`              |
    /// | `PAYMENT_WEBHOOK_SECRET`     | unset                   |
    /// | `FREE_GENERATION_RATE_LIMIT` | `5`                     |
    /// | `PAID_GENERATION_RATE_LIMIT` | `10`                    |
    /// | `GENERATION_RATE_WINDOW_SECS`| `60`                    |
    ///
    /// See [`JwtConfig::from_env`], [`ProviderConfig::from_env`] and
    /// [`StorageConfig::from_env`] for the nested sections.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let reconcile_concurrency: usize = std::env::var("RECONCILE_CONCURRENCY")
            .unwrap_or_else(|_| DEFAULT_RECONCILE_CONCURRENCY.to_string())
            .parse()
            .expect("RECONCILE_CONCURRENCY must be a valid usize");
        assert!(reconcile_concurrency > 0, "RECONCILE_CONCURRENCY must be at least 1");

        let max_artifact_bytes: usize = std::env::var("MAX_ARTIFACT_BYTES")
            .unwrap_or_else(|_| DEFAULT_MAX_ARTIFACT_BYTES.to_string())
            .parse()
            .expect("MAX_ARTIFACT_BYTES must be a valid usize");

        let payment_webhook_secret = non_empty_var("PAYMENT_WEBHOOK_SECRET");

        let rate_window = secs_var("GENERATION_RATE_WINDOW_SECS", Duration::from_secs(60));
        let free_rate_limit = rate_limit_from_env(
            "FREE_GENERATION_RATE_LIMIT",
            DEFAULT_FREE_RATE_LIMIT,
            rate_window,
        );
        let paid_rate_limit = rate_limit_from_env(
            "PAID_GENERATION_RATE_LIMIT",
            DEFAULT_PAID_RATE_LIMIT,
            rate_window,
        );

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            jwt: JwtConfig::from_env(),
            pipeline: pipeline_from_env(),
            provider: ProviderConfig::from_env(),
            storage: StorageConfig::from_env(),
            reconcile_concurrency,
            max_artifact_bytes,
            payment_webhook_secret,
            free_rate_limit,
            paid_rate_limit,
        }
    }
}

impl ProviderConfig {
    /// | Env Var             | Required | Default                                |
    /// |---------------------|----------|----------------------------------------|
    /// | `PROVIDER_API_KEY`  | **yes**  | --                                     |
    /// | `PROVIDER_BASE_URL` | no       | `https://api.wavespeed.ai/api/v3`      |
    /// | `PROVIDER_MODEL`    | no       | `google/nano-banana-pro/edit-ultra`    |
    ///
    /// # Panics
    ///
    /// Panics if `PROVIDER_API_KEY` is not set or is empty.
    pub fn from_env() -> Self {
        let api_key = non_empty_var("PROVIDER_API_KEY")
            .expect("PROVIDER_API_KEY must be set in the environment");
        let base_url = std::env::var("PROVIDER_BASE_URL")
            .unwrap_or_else(|_| "https://api.wavespeed.ai/api/v3".into());
        let model = std::env::var("PROVIDER_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());

        Self {
            base_url,
            api_key,
            model,
        }
    }
}

impl StorageConfig {
    /// | Env Var                 | Default       |
    /// |-------------------------|---------------|
    /// | `STORAGE_TYPE`          | `local`       |
    /// | `STORAGE_PATH`          | `./storage`   |
    /// | `STORAGE_PUBLIC_PREFIX` | `/storage`    |
    /// | `S3_BUCKET`             | required for `s3` |
    /// | `S3_REGION`             | `us-east-1`   |
    pub fn from_env() -> Self {
        let kind = std::env::var("STORAGE_TYPE").unwrap_or_else(|_| "local".into());
        match kind.as_str() {
            "local" => Self::Local {
                path: std::env::var("STORAGE_PATH").unwrap_or_else(|_| "./storage".into()),
                public_prefix: std::env::var("STORAGE_PUBLIC_PREFIX")
                    .unwrap_or_else(|_| "/storage".into()),
            },
            "s3" => Self::S3 {
                bucket: non_empty_var("S3_BUCKET")
                    .expect("S3_BUCKET must be set when STORAGE_TYPE=s3"),
                region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
            },
            other => panic!("STORAGE_TYPE must be 'local' or 's3', got '{other}'"),
        }
    }
}

fn pipeline_from_env() -> PipelineConfig {
    let free_generations_per_month: i32 = std::env::var("FREE_GENERATIONS_PER_MONTH")
        .unwrap_or_else(|_| DEFAULT_FREE_GENERATIONS_PER_MONTH.to_string())
        .parse()
        .expect("FREE_GENERATIONS_PER_MONTH must be a valid i32");

    let poll_after = secs_var("POLL_AFTER_SECS", DEFAULT_POLL_AFTER);
    let poll_interval = secs_var("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL);

    let poll_max_attempts: u32 = std::env::var("POLL_MAX_ATTEMPTS")
        .unwrap_or_else(|_| DEFAULT_POLL_MAX_ATTEMPTS.to_string())
        .parse()
        .expect("POLL_MAX_ATTEMPTS must be a valid u32");

    PipelineConfig {
        free_generations_per_month,
        public_base_url: non_empty_var("PUBLIC_BASE_URL"),
        model_name: std::env::var("PROVIDER_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into()),
        poll_after,
        poll_interval,
        poll_max_attempts,
    }
}

fn rate_limit_from_env(name: &str, default: u32, window: Duration) -> RateLimitConfig {
    let max_requests: u32 = std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or_else(|e| panic!("{name} must be a valid u32: {e}"));
    assert!(max_requests > 0, "{name} must be at least 1");
    assert!(!window.is_zero(), "GENERATION_RATE_WINDOW_SECS must be at least 1");

    RateLimitConfig {
        max_requests,
        window,
        max_tracked_clients: DEFAULT_MAX_TRACKED_CLIENTS,
    }
}

fn secs_var(name: &str, default: Duration) -> Duration {
    let secs: u64 = std::env::var(name)
        .unwrap_or_else(|_| default.as_secs().to_string())
        .parse()
        .unwrap_or_else(|e| panic!("{name} must be a valid u64: {e}"));
    Duration::from_secs(secs)
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
