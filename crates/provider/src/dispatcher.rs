//! The dispatch seam between the pipeline and the provider.

use async_trait::async_trait;
use studio_core::generation::EditParameters;
use studio_core::notification::ProviderReport;

use crate::api::{ProviderApi, ProviderApiError};

/// Why a task could not be submitted or polled.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The provider answered with a non-success status.
    #[error("provider rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The provider could not be reached or timed out.
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    /// The provider answered but the body was unusable.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl From<ProviderApiError> for DispatchError {
    fn from(err: ProviderApiError) -> Self {
        match err {
            ProviderApiError::Request(e) => Self::Unreachable(e.to_string()),
            ProviderApiError::ApiError { status, body } => Self::Rejected { status, body },
            ProviderApiError::MalformedResponse(msg) => Self::MalformedResponse(msg),
        }
    }
}

/// Submits edit tasks to the provider and queries their state.
///
/// Implementations do not retry; the caller decides what a failure means.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    /// Submit a task. Returns the provider-assigned task id.
    async fn submit(
        &self,
        input_ref: &str,
        params: &EditParameters,
        callback_url: &str,
    ) -> Result<String, DispatchError>;

    /// Fetch the current report for a previously submitted task.
    async fn poll(&self, external_task_id: &str) -> Result<ProviderReport, DispatchError>;
}

#[async_trait]
impl TaskDispatcher for ProviderApi {
    async fn submit(
        &self,
        input_ref: &str,
        params: &EditParameters,
        callback_url: &str,
    ) -> Result<String, DispatchError> {
        let task = self
            .create_edit_task(input_ref, params, Some(callback_url))
            .await?;
        if task.id.trim().is_empty() {
            return Err(DispatchError::MalformedResponse(
                "submission response has an empty task id".to_string(),
            ));
        }
        tracing::debug!(external_task_id = %task.id, "Provider task created");
        Ok(task.id)
    }

    async fn poll(&self, external_task_id: &str) -> Result<ProviderReport, DispatchError> {
        let task = self.get_prediction_result(external_task_id).await?;
        Ok(task.into_report())
    }
}
