//! Inbound webhooks: provider task notifications and payment confirmations.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use studio_core::credits::find_pack;
use studio_core::error::CoreError;
use studio_core::notification::parse_notification;
use studio_core::signing::verify_signature;
use studio_core::types::DbId;
use studio_db::repositories::{AccountRepo, CreditRepo};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Header carrying the hex HMAC-SHA256 of the raw payment body.
pub const PAYMENT_SIGNATURE_HEADER: &str = "x-payment-signature";

/// Acknowledgement returned to the provider for every notification.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// POST /api/v1/webhooks/provider
///
/// Always answers 200 so the provider does not retry; malformed payloads
/// are logged and dropped. Valid ones are resolved in the background.
pub async fn provider_notification(
    State(state): State<AppState>,
    body: Bytes,
) -> Json<WebhookAck> {
    match parse_notification(&body) {
        Ok((external_task_id, report)) => {
            tracing::info!(
                external_task_id = %external_task_id,
                status = ?report.status,
                "Provider notification received",
            );
            state
                .reconciler
                .enqueue_notification(external_task_id, report);
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                body_len = body.len(),
                "Malformed provider notification ignored",
            );
        }
    }
    Json(WebhookAck { received: true })
}

/// Body of a payment confirmation.
#[derive(Debug, Deserialize)]
pub struct PaymentConfirmation {
    pub session_id: String,
    pub account_id: DbId,
    pub pack_id: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentOutcome {
    /// `false` when this session had already been credited.
    pub credited: bool,
    pub credits: i32,
    pub balance: i32,
}

/// POST /api/v1/webhooks/payments
///
/// Credits the purchased pack once per payment session. The body must be
/// signed with the shared payment secret.
pub async fn payment_confirmation(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<DataResponse<PaymentOutcome>>> {
    let secret = state.config.payment_webhook_secret.as_deref().ok_or_else(|| {
        AppError::Core(CoreError::Unavailable(
            "payment webhook secret is not configured".into(),
        ))
    })?;

    let signature = headers
        .get(PAYMENT_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !verify_signature(secret, &body, signature) {
        tracing::warn!("Payment confirmation rejected: bad signature");
        return Err(AppError::Core(CoreError::Unauthorized(
            "Invalid payment signature".into(),
        )));
    }

    let confirmation: PaymentConfirmation = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid payment confirmation: {e}")))?;
    if confirmation.session_id.trim().is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "session_id is required".into(),
        )));
    }
    let pack = find_pack(&confirmation.pack_id)?;

    AccountRepo::find_by_id(&state.pool, confirmation.account_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Account",
            id: confirmation.account_id.to_string(),
        }))?;

    let credited = CreditRepo::credit_for_purchase(
        &state.pool,
        confirmation.account_id,
        &confirmation.session_id,
        pack.credits,
    )
    .await?;

    if credited {
        tracing::info!(
            account_id = confirmation.account_id,
            session_id = %confirmation.session_id,
            pack_id = pack.id,
            credits = pack.credits,
            "Purchase credited",
        );
    } else {
        tracing::info!(
            account_id = confirmation.account_id,
            session_id = %confirmation.session_id,
            "Duplicate payment confirmation ignored",
        );
    }

    let balance = CreditRepo::balance(&state.pool, confirmation.account_id)
        .await?
        .unwrap_or_default();

    Ok(Json(DataResponse {
        data: PaymentOutcome {
            credited,
            credits: pack.credits,
            balance,
        },
    }))
}
