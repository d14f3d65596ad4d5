//! Bounded reconciliation worker.
//!
//! Provider notifications are acknowledged by the webhook handler at once
//! and confirmed with the provider here, at most `max_concurrency` at a
//! time. Every dispatched
//! job also gets a poll watchdog, which spends most of its life asleep and
//! so does not hold a permit.
//!
//! Both kinds of task are tracked. [`Reconciler::wait_idle`] waits for the
//! queued notifications; [`Reconciler::shutdown`] cancels everything and
//! waits for in-flight work up to a deadline. A watchdog cut short by
//! shutdown leaves its job `Processing`; [`Reconciler::rearm`] picks it up
//! on the next start.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use studio_core::notification::ProviderReport;
use studio_db::models::job::Job;
use studio_db::repositories::JobRepo;
use studio_pipeline::{Poller, Resolution};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Upper bound on jobs re-armed at startup.
const REARM_LIMIT: i64 = 1000;

pub struct Reconciler {
    poller: Arc<Poller>,
    permits: Arc<Semaphore>,
    notifications: TaskTracker,
    watchdogs: TaskTracker,
    cancel: CancellationToken,
}

impl Reconciler {
    pub fn new(poller: Arc<Poller>, max_concurrency: usize) -> Self {
        Self {
            poller,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            notifications: TaskTracker::new(),
            watchdogs: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Queue a provider notification for confirmation and resolution.
    /// Never blocks the caller.
    pub fn enqueue_notification(&self, external_task_id: String, report: ProviderReport) {
        if self.cancel.is_cancelled() {
            tracing::warn!(
                external_task_id = %external_task_id,
                "Shutting down, notification left to the poll fallback",
            );
            return;
        }
        let poller = Arc::clone(&self.poller);
        let permits = Arc::clone(&self.permits);
        let cancel = self.cancel.clone();

        self.notifications.spawn(async move {
            let _permit = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::warn!(
                        external_task_id = %external_task_id,
                        "Shutting down, notification left to the poll fallback",
                    );
                    return;
                }
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            match poller.confirm(&external_task_id, report).await {
                Ok(resolution) => log_resolution(&external_task_id, "notification", &resolution),
                Err(e) => tracing::error!(
                    external_task_id = %external_task_id,
                    error = %e,
                    "Notification could not be applied",
                ),
            }
        });
    }

    /// Start the poll watchdog for a dispatched job.
    pub fn watch(&self, job: &Job) {
        let Some(external_task_id) = job.external_task_id.clone() else {
            tracing::debug!(job_id = %job.id, "Job was never dispatched, nothing to watch");
            return;
        };
        let poller = Arc::clone(&self.poller);
        let cancel = self.cancel.clone();
        let job_id = job.id;

        self.watchdogs.spawn(async move {
            match poller.watch(job_id, &external_task_id, &cancel).await {
                Ok(resolution) => log_resolution(&external_task_id, "poll", &resolution),
                Err(e) => tracing::error!(
                    job_id = %job_id,
                    external_task_id = %external_task_id,
                    error = %e,
                    "Poll fallback could not resolve job",
                ),
            }
        });
    }

    /// Watch every job left `Processing` by a previous run.
    pub async fn rearm(&self, pool: &PgPool) -> Result<usize, sqlx::Error> {
        let jobs = JobRepo::list_processing(pool, REARM_LIMIT).await?;
        for job in &jobs {
            self.watch(job);
        }
        Ok(jobs.len())
    }

    /// Wait until every queued notification has been resolved.
    pub async fn wait_idle(&self) {
        self.notifications.close();
        self.notifications.wait().await;
        // Shutdown closes the tracker for good.
        if !self.cancel.is_cancelled() {
            self.notifications.reopen();
        }
    }

    /// Whether new notifications are still being accepted.
    pub fn is_accepting(&self) -> bool {
        !self.notifications.is_closed()
    }

    /// Cancel pending work and wait for in-flight tasks, up to `timeout`.
    ///
    /// Returns `false` if the deadline passed first.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.cancel.cancel();
        self.notifications.close();
        self.watchdogs.close();

        let drained = tokio::time::timeout(timeout, async {
            self.notifications.wait().await;
            self.watchdogs.wait().await;
        })
        .await
        .is_ok();

        if drained {
            tracing::info!("Reconciler drained");
        } else {
            tracing::warn!(
                notifications = self.notifications.len(),
                watchdogs = self.watchdogs.len(),
                "Reconciler shutdown timed out with tasks still running",
            );
        }
        drained
    }
}

fn log_resolution(external_task_id: &str, source: &'static str, resolution: &Resolution) {
    match resolution {
        Resolution::Completed(job) => {
            tracing::info!(job_id = %job.id, external_task_id, source, "Job resolved: completed");
        }
        Resolution::Failed { job, cause } => {
            tracing::info!(
                job_id = %job.id,
                external_task_id,
                source,
                cause = %cause,
                "Job resolved: failed",
            );
        }
        Resolution::LostRace { job_id } | Resolution::AlreadyTerminal { job_id } => {
            tracing::debug!(job_id = %job_id, external_task_id, source, "Job already resolved");
        }
        Resolution::StillRunning { job_id } => {
            tracing::debug!(job_id = %job_id, external_task_id, source, "Job still running");
        }
        Resolution::UnknownTask => {
            tracing::debug!(external_task_id, source, "No job for provider task");
        }
    }
}
