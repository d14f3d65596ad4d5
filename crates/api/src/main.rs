use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use studio_pipeline::fetch::HttpFetcher;
use studio_pipeline::storage::{ArtifactStorage, LocalStorage, S3Storage};
use studio_pipeline::watermark::TextWatermarker;
use studio_provider::ProviderApi;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use studio_api::config::{ServerConfig, StorageConfig};
use studio_api::router::build_app_router;
use studio_api::state::{AppState, Collaborators};

const DEFAULT_LOG_FILTER: &str = "studio_api=debug,studio_pipeline=debug,tower_http=debug";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");
    if config.pipeline.public_base_url.is_none() {
        tracing::warn!("PUBLIC_BASE_URL is not set; generation requests will be refused");
    }
    if config.payment_webhook_secret.is_none() {
        tracing::warn!("PAYMENT_WEBHOOK_SECRET is not set; payment confirmations will be refused");
    }

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = studio_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    studio_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    studio_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Collaborators ---
    let dispatcher = ProviderApi::new(
        config.provider.base_url.clone(),
        config.provider.api_key.clone(),
        config.provider.model.clone(),
    )
    .expect("Failed to build provider client");
    let fetcher =
        HttpFetcher::new(config.max_artifact_bytes).expect("Failed to build artifact fetcher");
    let storage = build_storage(&config.storage).await;
    tracing::info!(model = %config.provider.model, "Provider client ready");

    // --- App state ---
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    let state = AppState::new(
        pool.clone(),
        config,
        Collaborators {
            dispatcher: Arc::new(dispatcher),
            fetcher: Arc::new(fetcher),
            watermarker: Arc::new(TextWatermarker::default()),
            storage,
        },
    );
    let reconciler = Arc::clone(&state.reconciler);

    // --- Re-arm jobs left processing by a previous run ---
    match reconciler.rearm(&pool).await {
        Ok(0) => {}
        Ok(count) => tracing::info!(count, "Re-armed poll fallback for processing jobs"),
        Err(e) => tracing::error!(error = %e, "Failed to re-arm processing jobs"),
    }

    // --- Router ---
    let app = build_app_router(state);

    // --- Start server ---
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, draining reconciler");
    reconciler.shutdown(shutdown_timeout).await;

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
}

async fn build_storage(config: &StorageConfig) -> Arc<dyn ArtifactStorage> {
    match config {
        StorageConfig::Local {
            path,
            public_prefix,
        } => {
            tracing::info!(path = %path, "Using local artifact storage");
            Arc::new(LocalStorage::new(path.clone(), public_prefix))
        }
        StorageConfig::S3 { bucket, region } => {
            tracing::info!(bucket = %bucket, region = %region, "Using S3 artifact storage");
            Arc::new(S3Storage::connect(bucket.clone(), region.clone()).await)
        }
    }
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM to start graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
