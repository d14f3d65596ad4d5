//! Outcome reconciliation.
//!
//! [`OutcomeProcessor::resolve`] is called for every provider report, from
//! the webhook and from the poll fallback, any number of times per task.
//! It applies the outcome at most once:
//!
//! 1. Unknown task ids and terminal jobs are no-ops.
//! 2. A reported failure fails the job, with no ledger effect.
//! 3. A reported success fetches the artifact, watermarks it for free jobs
//!    and stores it, then in one transaction completes the job (a
//!    conditional update) and applies the ledger effect.
//! 4. If step 3 fails anywhere, the transaction rolls back and the job is
//!    failed with the cause instead.
//!
//! When two resolvers race, the conditional update lets exactly one win.
//! The loser rolls back, discards the artifact it stored and reports
//! [`Resolution::LostRace`].

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use studio_core::notification::{ProviderReport, ProviderStatus};
use studio_core::quota;
use studio_core::types::JobId;
use studio_db::models::job::{Job, JobOwner};
use studio_db::repositories::{CreditRepo, JobRepo, QuotaRepo};

use crate::error::PipelineError;
use crate::fetch::ArtifactFetcher;
use crate::storage::ArtifactStorage;
use crate::watermark::Watermarker;

/// Extension of stored outputs. The provider is asked for JPEG and the
/// watermarker re-encodes as JPEG.
const OUTPUT_EXTENSION: &str = "jpg";

/// What a call to [`OutcomeProcessor::resolve`] did.
#[derive(Debug)]
pub enum Resolution {
    /// No job carries this provider task id.
    UnknownTask,
    /// The job was already terminal; nothing was touched.
    AlreadyTerminal { job_id: JobId },
    /// The provider has not finished yet.
    StillRunning { job_id: JobId },
    /// Another resolver reached a terminal state first.
    LostRace { job_id: JobId },
    Completed(Job),
    Failed { job: Job, cause: PipelineError },
}

impl Resolution {
    /// Whether the job is known to be terminal after this call.
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::StillRunning { .. })
    }
}

/// Outcome of the success path before any fallback to `Failed`.
enum Finalized {
    Won(Job),
    Lost,
}

pub struct OutcomeProcessor {
    pool: PgPool,
    fetcher: Arc<dyn ArtifactFetcher>,
    watermarker: Arc<dyn Watermarker>,
    storage: Arc<dyn ArtifactStorage>,
}

impl OutcomeProcessor {
    pub fn new(
        pool: PgPool,
        fetcher: Arc<dyn ArtifactFetcher>,
        watermarker: Arc<dyn Watermarker>,
        storage: Arc<dyn ArtifactStorage>,
    ) -> Self {
        Self {
            pool,
            fetcher,
            watermarker,
            storage,
        }
    }

    /// Apply a provider report to the job that owns `external_task_id`.
    ///
    /// Only a database failure while recording the final `Failed` state is
    /// returned as an error; the job then stays non-terminal for the poll
    /// fallback to retry.
    pub async fn resolve(
        &self,
        external_task_id: &str,
        report: ProviderReport,
    ) -> Result<Resolution, PipelineError> {
        let Some(job) = JobRepo::find_by_external_task_id(&self.pool, external_task_id).await?
        else {
            tracing::warn!(external_task_id, "Outcome for unknown provider task ignored");
            return Ok(Resolution::UnknownTask);
        };

        if job.is_terminal() {
            tracing::debug!(job_id = %job.id, external_task_id, "Job already terminal, skipping");
            return Ok(Resolution::AlreadyTerminal { job_id: job.id });
        }

        match report.status {
            ProviderStatus::Completed => match self.finalize_success(&job, &report).await {
                Ok(Finalized::Won(completed)) => {
                    tracing::info!(
                        job_id = %completed.id,
                        is_free = completed.is_free,
                        "Generation job completed",
                    );
                    Ok(Resolution::Completed(completed))
                }
                Ok(Finalized::Lost) => Ok(Resolution::LostRace { job_id: job.id }),
                Err(cause) => self.fail(&job, cause).await,
            },
            ProviderStatus::Failed => {
                let cause = PipelineError::ProviderTaskFailed(report.failure_reason());
                self.fail(&job, cause).await
            }
            ProviderStatus::Created | ProviderStatus::Processing | ProviderStatus::Other(_) => {
                tracing::debug!(
                    job_id = %job.id,
                    status = ?report.status,
                    "Provider task still running",
                );
                Ok(Resolution::StillRunning { job_id: job.id })
            }
        }
    }

    /// Fetch, post-process and store the output, then commit completion and
    /// the ledger effect together.
    async fn finalize_success(
        &self,
        job: &Job,
        report: &ProviderReport,
    ) -> Result<Finalized, PipelineError> {
        let output_url = report.outputs.first().ok_or_else(|| {
            PipelineError::Reconciliation("provider reported success without outputs".into())
        })?;

        let bytes = self
            .fetcher
            .fetch(output_url)
            .await
            .map_err(|e| PipelineError::Reconciliation(format!("artifact fetch: {e}")))?;

        let bytes = if job.is_free {
            self.watermark(bytes).await?
        } else {
            bytes
        };

        let output_ref = self
            .storage
            .store(bytes, OUTPUT_EXTENSION)
            .await
            .map_err(|e| PipelineError::Reconciliation(format!("artifact store: {e}")))?;

        match self.commit_completion(job, &output_ref).await {
            Ok(Finalized::Won(completed)) => Ok(Finalized::Won(completed)),
            Ok(Finalized::Lost) => {
                tracing::info!(job_id = %job.id, "Lost terminal race, discarding stored artifact");
                self.discard(&output_ref).await;
                Ok(Finalized::Lost)
            }
            Err(e) => {
                self.discard(&output_ref).await;
                Err(e)
            }
        }
    }

    async fn watermark(&self, bytes: Vec<u8>) -> Result<Vec<u8>, PipelineError> {
        let watermarker = Arc::clone(&self.watermarker);
        tokio::task::spawn_blocking(move || watermarker.apply(&bytes))
            .await
            .map_err(|e| PipelineError::Reconciliation(format!("watermark task: {e}")))?
            .map_err(|e| PipelineError::Reconciliation(format!("watermark: {e}")))
    }

    /// The terminal write and the ledger effect, in one transaction.
    async fn commit_completion(
        &self,
        job: &Job,
        output_ref: &str,
    ) -> Result<Finalized, PipelineError> {
        let mut tx = self.pool.begin().await?;

        let Some(completed) = JobRepo::complete(&mut *tx, job.id, output_ref).await? else {
            tx.rollback().await?;
            return Ok(Finalized::Lost);
        };

        match completed.owner() {
            Some(JobOwner::Anonymous {
                device_id,
                ip_address,
            }) => {
                let period = quota::period_label(Utc::now());
                let count = QuotaRepo::commit(&mut *tx, &device_id, &ip_address, &period).await?;
                tracing::debug!(job_id = %job.id, period = %period, count, "Free quota consumed");
            }
            Some(JobOwner::RegisteredUser(account_id)) => {
                let debited = CreditRepo::debit_for_generation(&mut *tx, account_id, job.id).await?;
                if !debited {
                    // The job id key already exists: a previous completion
                    // was debited. Nothing more to charge.
                    tracing::warn!(job_id = %job.id, account_id, "Generation already debited");
                }
            }
            None => {
                return Err(PipelineError::Reconciliation(format!(
                    "job {} has no valid owner",
                    job.id
                )));
            }
        }

        tx.commit().await?;
        Ok(Finalized::Won(completed))
    }

    /// Record a failure. A job that turned terminal in the meantime is left alone.
    async fn fail(&self, job: &Job, cause: PipelineError) -> Result<Resolution, PipelineError> {
        let message = cause.job_error_message();
        match JobRepo::fail(&self.pool, job.id, &message).await {
            Ok(Some(failed)) => {
                tracing::warn!(job_id = %failed.id, error = %cause, "Generation job failed");
                Ok(Resolution::Failed { job: failed, cause })
            }
            Ok(None) => Ok(Resolution::LostRace { job_id: job.id }),
            Err(e) => {
                tracing::error!(
                    job_id = %job.id,
                    cause = %cause,
                    error = %e,
                    "Could not record job failure, leaving job for the poll fallback",
                );
                Err(PipelineError::Database(e))
            }
        }
    }

    async fn discard(&self, output_ref: &str) {
        if let Err(e) = self.storage.delete(output_ref).await {
            tracing::warn!(output_ref, error = %e, "Failed to delete orphaned artifact");
        }
    }
}
