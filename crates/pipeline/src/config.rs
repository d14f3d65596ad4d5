//! Pipeline configuration, built once at startup and shared read-only.

use std::time::Duration;

use studio_core::generation::DEFAULT_MODEL;
use studio_core::quota::DEFAULT_FREE_GENERATIONS_PER_MONTH;

/// Default delay before the first fallback poll after dispatch.
pub const DEFAULT_POLL_AFTER: Duration = Duration::from_secs(60);

/// Default delay between fallback polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of fallback polls before giving up.
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 60;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Free generations allowed per device+IP per calendar month (UTC).
    pub free_generations_per_month: i32,
    /// Public HTTPS base address the provider calls back on. Job creation
    /// is refused while this is unset.
    pub public_base_url: Option<String>,
    /// Provider model path recorded on each job.
    pub model_name: String,
    pub poll_after: Duration,
    pub poll_interval: Duration,
    pub poll_max_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            free_generations_per_month: DEFAULT_FREE_GENERATIONS_PER_MONTH,
            public_base_url: None,
            model_name: DEFAULT_MODEL.to_string(),
            poll_after: DEFAULT_POLL_AFTER,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
        }
    }
}
