//! REST API client for the compute provider.
//!
//! Wraps task submission and result retrieval using [`reqwest`]. Every
//! provider response carries its payload under a `data` key.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use studio_core::generation::EditParameters;
use studio_core::notification::ProviderReport;

/// Whole-request timeout for provider calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// TCP connect timeout for provider calls.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the provider API.
pub struct ProviderApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

/// Body of an edit-task submission.
#[derive(Debug, Serialize)]
struct EditTaskRequest<'a> {
    aspect_ratio: &'a str,
    enable_base64_output: bool,
    enable_sync_mode: bool,
    images: [&'a str; 1],
    output_format: &'static str,
    prompt: &'a str,
    resolution: &'a str,
}

/// The `{ "data": ... }` wrapper around every provider response.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// A provider task as returned by submission and result queries.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskData {
    /// Provider-assigned task identifier.
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub outputs: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TaskData {
    /// Normalize into the report shape shared with inbound notifications.
    /// A missing status is treated as still queued.
    pub fn into_report(self) -> ProviderReport {
        let status = self.status.as_deref().unwrap_or("created");
        ProviderReport::from_parts(status, self.outputs, self.error)
    }
}

/// Errors from the provider REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ProviderApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response whose body did not have the expected shape.
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderApi {
    /// Create a client for the given API root, e.g.
    /// `https://api.wavespeed.ai/api/v3`, and model path.
    pub fn new(base_url: String, api_key: String, model: String) -> Result<Self, ProviderApiError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, base_url, api_key, model))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        base_url: String,
        api_key: String,
        model: String,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.trim_matches('/').to_string(),
        }
    }

    /// Submit an edit task.
    ///
    /// Sends `POST {base}/{model}`. When `webhook_url` is given the provider
    /// calls it on completion.
    pub async fn create_edit_task(
        &self,
        input_ref: &str,
        params: &EditParameters,
        webhook_url: Option<&str>,
    ) -> Result<TaskData, ProviderApiError> {
        let body = EditTaskRequest {
            aspect_ratio: &params.aspect_ratio,
            enable_base64_output: false,
            enable_sync_mode: false,
            images: [input_ref],
            output_format: "jpeg",
            prompt: &params.prompt,
            resolution: &params.resolution,
        };

        let mut request = self
            .client
            .post(format!("{}/{}", self.base_url, self.model))
            .bearer_auth(&self.api_key)
            .json(&body);
        if let Some(url) = webhook_url {
            request = request.query(&[("webhook", url)]);
        }

        let response = request.send().await?;
        Self::parse_response(response).await
    }

    /// Fetch the current state of a task.
    ///
    /// Sends `GET {base}/predictions/{id}/result`.
    pub async fn get_prediction_result(
        &self,
        task_id: &str,
    ) -> Result<TaskData, ProviderApiError> {
        let response = self
            .client
            .get(format!("{}/predictions/{}/result", self.base_url, task_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Return the response unchanged on success, or an
    /// [`ProviderApiError::ApiError`] with the status and body text.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProviderApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Unwrap the `data` envelope of a successful JSON response.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderApiError> {
        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        let envelope: Envelope<T> = serde_json::from_str(&text)
            .map_err(|e| ProviderApiError::MalformedResponse(e.to_string()))?;
        Ok(envelope.data)
    }
}
