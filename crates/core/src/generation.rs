//! Generation request constants and validation.
//!
//! Everything a request must satisfy before a job row is created lives
//! here, so admission rejects malformed input without side effects.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum prompt length in characters.
pub const MAX_PROMPT_LENGTH: usize = 1000;

/// Maximum accepted length of a client-generated device identifier.
pub const MAX_DEVICE_ID_LENGTH: usize = 128;

/// Default output aspect ratio.
pub const DEFAULT_ASPECT_RATIO: &str = "1:1";

/// Aspect ratios the provider model accepts.
pub const VALID_ASPECT_RATIOS: &[&str] = &["1:1", "4:5", "16:9"];

/// Default output resolution.
pub const DEFAULT_RESOLUTION: &str = "8k";

/// Resolutions the provider model accepts.
pub const VALID_RESOLUTIONS: &[&str] = &["4k", "8k"];

/// Provider model used for every edit.
pub const DEFAULT_MODEL: &str = "google/nano-banana-pro/edit-ultra";

/// Path (under the public base address) the provider posts notifications to.
pub const PROVIDER_WEBHOOK_PATH: &str = "/api/v1/webhooks/provider";

// ---------------------------------------------------------------------------
// Edit parameters
// ---------------------------------------------------------------------------

/// The user-controlled parameters forwarded to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditParameters {
    pub prompt: String,
    pub resolution: String,
    pub aspect_ratio: String,
}

impl EditParameters {
    /// Build parameters, falling back to the defaults for omitted fields.
    pub fn new(prompt: &str, resolution: Option<&str>, aspect_ratio: Option<&str>) -> Self {
        Self {
            prompt: prompt.trim().to_string(),
            resolution: resolution.unwrap_or(DEFAULT_RESOLUTION).to_string(),
            aspect_ratio: aspect_ratio.unwrap_or(DEFAULT_ASPECT_RATIO).to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_prompt(&self.prompt)?;
        validate_resolution(&self.resolution)?;
        validate_aspect_ratio(&self.aspect_ratio)
    }
}

// ---------------------------------------------------------------------------
// Field validation
// ---------------------------------------------------------------------------

pub fn validate_prompt(prompt: &str) -> Result<(), CoreError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("prompt must not be empty".into()));
    }
    let len = trimmed.chars().count();
    if len > MAX_PROMPT_LENGTH {
        return Err(CoreError::Validation(format!(
            "prompt is {len} characters; maximum is {MAX_PROMPT_LENGTH}"
        )));
    }
    Ok(())
}

pub fn validate_aspect_ratio(ratio: &str) -> Result<(), CoreError> {
    if VALID_ASPECT_RATIOS.contains(&ratio) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid aspect_ratio '{ratio}'. Must be one of: {VALID_ASPECT_RATIOS:?}"
        )))
    }
}

pub fn validate_resolution(resolution: &str) -> Result<(), CoreError> {
    if VALID_RESOLUTIONS.contains(&resolution) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid resolution '{resolution}'. Must be one of: {VALID_RESOLUTIONS:?}"
        )))
    }
}

/// Device ids are opaque client strings; only shape is checked.
pub fn validate_device_id(device_id: &str) -> Result<(), CoreError> {
    if device_id.trim().is_empty() {
        return Err(CoreError::Validation("device_id is required".into()));
    }
    if device_id.len() > MAX_DEVICE_ID_LENGTH {
        return Err(CoreError::Validation(format!(
            "device_id must be at most {MAX_DEVICE_ID_LENGTH} bytes"
        )));
    }
    if device_id.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(CoreError::Validation(
            "device_id must not contain whitespace or control characters".into(),
        ));
    }
    Ok(())
}

/// The provider fetches the input itself, so the reference must be an
/// absolute `http(s)` URL with a host.
pub fn validate_input_ref(input_ref: &str) -> Result<(), CoreError> {
    let rest = input_ref
        .strip_prefix("https://")
        .or_else(|| input_ref.strip_prefix("http://"))
        .ok_or_else(|| {
            CoreError::Validation(
                "image_url must be a fully-qualified http(s) URL".into(),
            )
        })?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() || input_ref.chars().any(char::is_whitespace) {
        return Err(CoreError::Validation(
            "image_url must be a fully-qualified http(s) URL".into(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Callback URL
// ---------------------------------------------------------------------------

/// Derive the provider callback URL from the configured public base address.
///
/// Fails closed with [`CoreError::Unavailable`] when the base address is
/// missing or not HTTPS: the provider would otherwise have nowhere to send
/// the outcome.
pub fn callback_url(public_base_url: Option<&str>) -> Result<String, CoreError> {
    let base = public_base_url
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .ok_or_else(|| {
            CoreError::Unavailable("public base URL is not configured".into())
        })?;

    let host = base.strip_prefix("https://").unwrap_or_default();
    if host.trim_end_matches('/').is_empty() {
        return Err(CoreError::Unavailable(
            "public base URL must be an absolute https:// URL".into(),
        ));
    }

    Ok(format!("{}{PROVIDER_WEBHOOK_PATH}", base.trim_end_matches('/')))
}
