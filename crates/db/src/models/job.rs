//! Generation job models and DTOs.

use serde::Serialize;
use sqlx::FromRow;
use studio_core::generation::EditParameters;
use studio_core::types::{DbId, JobId, Timestamp};

use super::status::{JobStatus, StatusId};

/// A row from the `generation_jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct Job {
    pub id: JobId,
    pub account_id: Option<DbId>,
    pub device_id: Option<String>,
    pub ip_address: Option<String>,
    pub external_task_id: Option<String>,
    pub status_id: StatusId,
    pub input_ref: String,
    pub output_ref: Option<String>,
    pub prompt: String,
    pub model_name: String,
    pub resolution: String,
    pub aspect_ratio: String,
    pub is_free: bool,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// Who a job belongs to. Exactly one form is stored per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOwner {
    RegisteredUser(DbId),
    Anonymous {
        device_id: String,
        ip_address: String,
    },
}

impl Job {
    /// Decoded status. `None` only if the row holds an unseeded status id.
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_id(self.status_id)
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_some_and(JobStatus::is_terminal)
    }

    pub fn owner(&self) -> Option<JobOwner> {
        match (&self.account_id, &self.device_id, &self.ip_address) {
            (Some(account_id), None, None) => Some(JobOwner::RegisteredUser(*account_id)),
            (None, Some(device_id), Some(ip_address)) => Some(JobOwner::Anonymous {
                device_id: device_id.clone(),
                ip_address: ip_address.clone(),
            }),
            _ => None,
        }
    }

    /// Parameters to forward to the provider.
    pub fn edit_parameters(&self) -> EditParameters {
        EditParameters {
            prompt: self.prompt.clone(),
            resolution: self.resolution.clone(),
            aspect_ratio: self.aspect_ratio.clone(),
        }
    }
}

/// Input for creating a pending job.
#[derive(Debug, Clone)]
pub struct CreateJob {
    pub owner: JobOwner,
    pub input_ref: String,
    pub params: EditParameters,
    pub model_name: String,
}

impl CreateJob {
    /// Free jobs are exactly the anonymous ones.
    pub fn is_free(&self) -> bool {
        matches!(self.owner, JobOwner::Anonymous { .. })
    }
}

/// Status-query response: `{ id, status, output_image_url, error_message }`.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub id: JobId,
    pub status: &'static str,
    pub output_image_url: Option<String>,
    pub error_message: Option<String>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            status: job.status().map_or("unknown", JobStatus::name),
            output_image_url: job.output_ref.clone(),
            error_message: job.error_message.clone(),
        }
    }
}

/// One entry of a user's generation history.
#[derive(Debug, Clone, Serialize)]
pub struct JobHistoryItem {
    pub id: JobId,
    pub status: &'static str,
    pub input_image_url: String,
    pub output_image_url: Option<String>,
    pub prompt: String,
    pub resolution: String,
    pub aspect_ratio: String,
    pub is_free: bool,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl From<Job> for JobHistoryItem {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            status: job.status().map_or("unknown", JobStatus::name),
            input_image_url: job.input_ref,
            output_image_url: job.output_ref,
            prompt: job.prompt,
            resolution: job.resolution,
            aspect_ratio: job.aspect_ratio,
            is_free: job.is_free,
            error_message: job.error_message,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}
