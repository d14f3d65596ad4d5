//! Provider task outcomes and inbound notification parsing.
//!
//! The provider reports the same shape through its webhook and through the
//! polling endpoint, so both paths normalize into a [`ProviderReport`].

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Provider status
// ---------------------------------------------------------------------------

/// Task status as reported by the compute provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    Created,
    Processing,
    Completed,
    Failed,
    /// Any status string this service does not recognise.
    Other(String),
}

impl ProviderStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "created" | "queued" | "pending" => Self::Created,
            "processing" | "running" => Self::Processing,
            "completed" | "succeeded" | "success" => Self::Completed,
            "failed" | "error" => Self::Failed,
            _ => Self::Other(raw.to_string()),
        }
    }

    /// `Completed` and `Failed` are the only statuses that finalize a job.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A normalized task outcome, from a notification or a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReport {
    pub status: ProviderStatus,
    pub outputs: Vec<String>,
    pub error: Option<String>,
}

impl ProviderReport {
    pub fn completed(outputs: Vec<String>) -> Self {
        Self {
            status: ProviderStatus::Completed,
            outputs,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ProviderStatus::Failed,
            outputs: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Build a report from raw provider fields. Blank error strings are
    /// dropped; the provider sends `""` on success.
    pub fn from_parts(status: &str, outputs: Option<Vec<String>>, error: Option<String>) -> Self {
        Self {
            status: ProviderStatus::parse(status),
            outputs: outputs.unwrap_or_default(),
            error: error.filter(|e| !e.trim().is_empty()),
        }
    }

    /// Human-readable failure reason, with a fallback when the provider sent none.
    pub fn failure_reason(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "Unknown provider error".to_string())
    }
}

// ---------------------------------------------------------------------------
// Notification payload
// ---------------------------------------------------------------------------

/// Raw webhook body. Every field is optional so that a malformed payload
/// still deserializes and can be acknowledged.
#[derive(Debug, Default, Deserialize)]
pub struct NotificationPayload {
    pub id: Option<String>,
    pub status: Option<String>,
    pub outputs: Option<Vec<String>>,
    pub error: Option<String>,
}

/// A notification that cannot be processed. It is still acknowledged.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MalformedNotification {
    #[error("notification body is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("notification is missing required field '{0}'")]
    MissingField(&'static str),
}

/// Parse a webhook body into the provider task id and its report.
pub fn parse_notification(body: &[u8]) -> Result<(String, ProviderReport), MalformedNotification> {
    let payload: NotificationPayload = serde_json::from_slice(body)
        .map_err(|e| MalformedNotification::InvalidJson(e.to_string()))?;

    let id = payload
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or(MalformedNotification::MissingField("id"))?;
    let status = payload
        .status
        .filter(|s| !s.trim().is_empty())
        .ok_or(MalformedNotification::MissingField("status"))?;

    Ok((
        id,
        ProviderReport::from_parts(&status, payload.outputs, payload.error),
    ))
}
