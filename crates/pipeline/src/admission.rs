//! Admission and dispatch of new generation jobs.
//!
//! Admission runs the policy checks (validation, callback address, quota or
//! credit) before any row is written. Once the job exists, a dispatch
//! failure no longer surfaces as an error: the job is failed and returned.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use studio_core::credits;
use studio_core::error::CoreError;
use studio_core::generation::{self, EditParameters};
use studio_core::quota;
use studio_core::types::DbId;
use studio_db::models::job::{CreateJob, Job, JobOwner};
use studio_db::repositories::{CreditRepo, JobRepo, QuotaRepo};
use studio_provider::TaskDispatcher;

use crate::config::PipelineConfig;
use crate::error::PipelineError;

/// A client's edit request, already parsed from the wire.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub input_ref: String,
    pub params: EditParameters,
}

impl GenerationRequest {
    pub fn validate(&self) -> Result<(), CoreError> {
        generation::validate_input_ref(&self.input_ref)?;
        self.params.validate()
    }
}

/// Creates jobs and hands them to the provider.
pub struct Admission {
    pool: PgPool,
    dispatcher: Arc<dyn TaskDispatcher>,
    config: Arc<PipelineConfig>,
}

impl Admission {
    pub fn new(
        pool: PgPool,
        dispatcher: Arc<dyn TaskDispatcher>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            pool,
            dispatcher,
            config,
        }
    }

    /// Admit a free, watermarked generation for an anonymous device.
    pub async fn submit_free(
        &self,
        device_id: &str,
        ip_address: &str,
        request: GenerationRequest,
    ) -> Result<Job, PipelineError> {
        generation::validate_device_id(device_id)?;
        request.validate()?;
        let callback_url = generation::callback_url(self.config.public_base_url.as_deref())?;

        let limit = self.config.free_generations_per_month;
        let period = quota::period_label(Utc::now());
        let check = QuotaRepo::check(&self.pool, device_id, ip_address, &period, limit).await?;
        // Jobs still in flight will consume quota when they complete.
        let in_flight = JobRepo::count_active_free(&self.pool, device_id, ip_address).await?;
        let reserved = check
            .current_count
            .saturating_add(i32::try_from(in_flight).unwrap_or(i32::MAX));
        if !check.allowed || !quota::is_within_limit(Some(reserved), limit) {
            tracing::info!(
                device_id,
                ip_address,
                current_count = check.current_count,
                in_flight,
                limit,
                "Free generation refused: monthly quota reached",
            );
            return Err(CoreError::QuotaExceeded { limit }.into());
        }

        let owner = JobOwner::Anonymous {
            device_id: device_id.to_string(),
            ip_address: ip_address.to_string(),
        };
        self.create_and_dispatch(owner, request, &callback_url).await
    }

    /// Admit a paid generation. The credit is only debited on completion.
    pub async fn submit_paid(
        &self,
        account_id: DbId,
        request: GenerationRequest,
    ) -> Result<Job, PipelineError> {
        request.validate()?;
        let callback_url = generation::callback_url(self.config.public_base_url.as_deref())?;

        let balance = CreditRepo::balance(&self.pool, account_id)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                entity: "Account",
                id: account_id.to_string(),
            })?;
        credits::ensure_can_afford(balance)?;

        self.create_and_dispatch(JobOwner::RegisteredUser(account_id), request, &callback_url)
            .await
    }

    async fn create_and_dispatch(
        &self,
        owner: JobOwner,
        request: GenerationRequest,
        callback_url: &str,
    ) -> Result<Job, PipelineError> {
        let job = JobRepo::create(
            &self.pool,
            &CreateJob {
                owner,
                input_ref: request.input_ref,
                params: request.params,
                model_name: self.config.model_name.clone(),
            },
        )
        .await?;
        tracing::info!(job_id = %job.id, is_free = job.is_free, "Generation job created");

        self.dispatch(job, callback_url).await
    }

    /// Submit a pending job. Returns the job as `Processing`, or as `Failed`
    /// when the provider refused it.
    async fn dispatch(&self, job: Job, callback_url: &str) -> Result<Job, PipelineError> {
        let submitted = self
            .dispatcher
            .submit(&job.input_ref, &job.edit_parameters(), callback_url)
            .await;

        let external_task_id = match submitted {
            Ok(id) => id,
            Err(e) => {
                let cause = PipelineError::Dispatch(e);
                tracing::warn!(job_id = %job.id, error = %cause, "Dispatch failed");
                return self.fail_pending(job, &cause).await;
            }
        };

        match JobRepo::mark_processing(&self.pool, job.id, &external_task_id).await {
            Ok(Some(processing)) => {
                tracing::info!(
                    job_id = %processing.id,
                    external_task_id = %external_task_id,
                    "Generation job dispatched",
                );
                Ok(processing)
            }
            Ok(None) => Err(PipelineError::Reconciliation(format!(
                "job {} left the pending state during dispatch",
                job.id
            ))),
            Err(e) => {
                // The provider has the task but we could not record it; the
                // job must not linger as pending.
                tracing::error!(
                    job_id = %job.id,
                    external_task_id = %external_task_id,
                    error = %e,
                    "Failed to record external task id",
                );
                let cause = PipelineError::Reconciliation(format!(
                    "could not record provider task {external_task_id}: {e}"
                ));
                self.fail_pending(job, &cause).await
            }
        }
    }

    async fn fail_pending(&self, job: Job, cause: &PipelineError) -> Result<Job, PipelineError> {
        let message = cause.job_error_message();
        match JobRepo::fail(&self.pool, job.id, &message).await? {
            Some(failed) => Ok(failed),
            None => Ok(JobRepo::find_by_id(&self.pool, job.id).await?.unwrap_or(job)),
        }
    }
}
