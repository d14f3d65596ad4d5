//! Pipeline error taxonomy.

use studio_core::error::CoreError;
use studio_provider::DispatchError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Admission-time rejection: validation, quota, credit, configuration.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The provider refused or never received the task.
    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    /// The provider reported the task as failed.
    #[error("Provider task failed: {0}")]
    ProviderTaskFailed(String),

    /// A successful result could not be fetched, post-processed or stored.
    #[error("Reconciliation failed: {0}")]
    Reconciliation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl PipelineError {
    /// Text recorded in `generation_jobs.error_message` when this error
    /// fails a job. Provider failures keep the provider's own wording.
    pub fn job_error_message(&self) -> String {
        match self {
            Self::ProviderTaskFailed(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}
