use std::sync::Arc;

use studio_pipeline::fetch::ArtifactFetcher;
use studio_pipeline::storage::ArtifactStorage;
use studio_pipeline::watermark::Watermarker;
use studio_pipeline::{Admission, OutcomeProcessor, Poller};
use studio_provider::TaskDispatcher;

use crate::background::Reconciler;
use crate::config::ServerConfig;
use crate::middleware::rate_limit::RateLimiter;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind `Arc` or is already `Clone`.
#[derive(Clone)]
pub struct AppState {
    pub pool: studio_db::DbPool,
    pub config: Arc<ServerConfig>,
    pub admission: Arc<Admission>,
    pub reconciler: Arc<Reconciler>,
    pub free_limiter: Arc<RateLimiter>,
    pub paid_limiter: Arc<RateLimiter>,
}

/// The external collaborators the pipeline is wired to.
pub struct Collaborators {
    pub dispatcher: Arc<dyn TaskDispatcher>,
    pub fetcher: Arc<dyn ArtifactFetcher>,
    pub watermarker: Arc<dyn Watermarker>,
    pub storage: Arc<dyn ArtifactStorage>,
}

impl AppState {
    /// Wire the pipeline and background worker around the collaborators.
    pub fn new(pool: studio_db::DbPool, config: ServerConfig, collaborators: Collaborators) -> Self {
        let config = Arc::new(config);
        let pipeline = Arc::new(config.pipeline.clone());

        let processor = Arc::new(OutcomeProcessor::new(
            pool.clone(),
            collaborators.fetcher,
            collaborators.watermarker,
            collaborators.storage,
        ));
        let poller = Arc::new(Poller::new(
            pool.clone(),
            Arc::clone(&collaborators.dispatcher),
            processor,
            &pipeline,
        ));
        let admission = Arc::new(Admission::new(
            pool.clone(),
            collaborators.dispatcher,
            pipeline,
        ));
        let reconciler = Arc::new(Reconciler::new(poller, config.reconcile_concurrency));

        let free_limiter = Arc::new(RateLimiter::new(config.free_rate_limit));
        let paid_limiter = Arc::new(RateLimiter::new(config.paid_rate_limit));

        Self {
            pool,
            config,
            admission,
            reconciler,
            free_limiter,
            paid_limiter,
        }
    }
}
