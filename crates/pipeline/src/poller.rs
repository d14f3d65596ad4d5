//! Poll fallback for provider notifications that are late or lost.
//!
//! After `poll_after`, the provider is polled up to `poll_max_attempts`
//! times, `poll_interval` apart, while the job is still non-terminal. Every
//! result goes through [`OutcomeProcessor::resolve`]. If the provider never
//! finishes, the job is resolved as failed with a timeout.
//!
//! Inbound notifications are unauthenticated, so [`Poller::confirm`] treats
//! a terminal notification as a prompt to ask the provider, and resolves
//! with the provider's own report rather than the posted one.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use studio_core::notification::ProviderReport;
use studio_core::types::JobId;
use studio_db::repositories::JobRepo;
use studio_provider::TaskDispatcher;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::processor::{OutcomeProcessor, Resolution};

/// Failure reason recorded when polling gives up.
pub const POLL_TIMEOUT_MESSAGE: &str = "Timed out waiting for the provider to finish";

pub struct Poller {
    pool: PgPool,
    dispatcher: Arc<dyn TaskDispatcher>,
    processor: Arc<OutcomeProcessor>,
    poll_after: Duration,
    poll_interval: Duration,
    max_attempts: u32,
}

impl Poller {
    pub fn new(
        pool: PgPool,
        dispatcher: Arc<dyn TaskDispatcher>,
        processor: Arc<OutcomeProcessor>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            pool,
            dispatcher,
            processor,
            poll_after: config.poll_after,
            poll_interval: config.poll_interval,
            max_attempts: config.poll_max_attempts,
        }
    }

    /// Resolve a provider notification against the provider's own view of
    /// the task.
    ///
    /// Non-terminal notifications are no-ops. For a terminal one the
    /// provider is polled once; outputs and failure reasons come from that
    /// answer only. If the provider cannot be reached the job is left for
    /// the watchdog.
    pub async fn confirm(
        &self,
        external_task_id: &str,
        notified: ProviderReport,
    ) -> Result<Resolution, PipelineError> {
        let Some(job) = JobRepo::find_by_external_task_id(&self.pool, external_task_id).await?
        else {
            tracing::info!(external_task_id, "Notification for unknown provider task");
            return Ok(Resolution::UnknownTask);
        };
        if job.is_terminal() {
            return Ok(Resolution::AlreadyTerminal { job_id: job.id });
        }
        if !notified.status.is_terminal() {
            return Ok(Resolution::StillRunning { job_id: job.id });
        }

        let report = self.dispatcher.poll(external_task_id).await?;
        if report.status != notified.status {
            tracing::warn!(
                job_id = %job.id,
                external_task_id,
                notified = ?notified.status,
                reported = ?report.status,
                "Notification disagrees with provider, using provider status",
            );
        }
        self.processor.resolve(external_task_id, report).await
    }

    /// Watch one dispatched job until it is terminal.
    ///
    /// Returns `StillRunning` only when cancelled; the job is then picked up
    /// again on the next start.
    pub async fn watch(
        &self,
        job_id: JobId,
        external_task_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Resolution, PipelineError> {
        if !sleep_or_cancel(self.poll_after, cancel).await {
            return Ok(Resolution::StillRunning { job_id });
        }

        for attempt in 1..=self.max_attempts {
            if attempt > 1 && !sleep_or_cancel(self.poll_interval, cancel).await {
                return Ok(Resolution::StillRunning { job_id });
            }

            // A notification may have finished the job in the meantime.
            match JobRepo::find_by_id(&self.pool, job_id).await {
                Ok(Some(job)) if job.is_terminal() => {
                    return Ok(Resolution::AlreadyTerminal { job_id });
                }
                Ok(Some(_)) => {}
                Ok(None) => return Ok(Resolution::UnknownTask),
                Err(e) => {
                    tracing::warn!(job_id = %job_id, attempt, error = %e, "Poll: job lookup failed");
                    continue;
                }
            }

            match self.dispatcher.poll(external_task_id).await {
                Ok(report) if report.status.is_terminal() => {
                    tracing::info!(
                        job_id = %job_id,
                        attempt,
                        status = ?report.status,
                        "Poll: provider task finished",
                    );
                    return self.processor.resolve(external_task_id, report).await;
                }
                Ok(_) => {
                    tracing::debug!(job_id = %job_id, attempt, "Poll: provider task still running");
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, attempt, error = %e, "Poll: provider query failed");
                }
            }
        }

        tracing::warn!(
            job_id = %job_id,
            attempts = self.max_attempts,
            "Poll: giving up, failing job with timeout",
        );
        self.processor
            .resolve(external_task_id, ProviderReport::failed(POLL_TIMEOUT_MESSAGE))
            .await
    }
}

/// Sleep for `duration`. Returns `false` if cancelled first.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
