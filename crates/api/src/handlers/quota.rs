//! Handler for `/quota`: the caller's remaining free generations.

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use studio_core::generation::validate_device_id;
use studio_core::quota;
use studio_db::repositories::{JobRepo, QuotaRepo};

use crate::error::AppResult;
use crate::middleware::client_ip::ClientIp;
use crate::query::DeviceParams;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct QuotaStatus {
    pub period: String,
    pub limit: i32,
    pub used: i32,
    /// Admitted jobs not yet finished; they hold a share of the limit.
    pub in_flight: i64,
    pub remaining: i32,
}

/// GET /api/v1/quota?device_id=
pub async fn get_quota(
    State(state): State<AppState>,
    ClientIp(ip_address): ClientIp,
    Query(params): Query<DeviceParams>,
) -> AppResult<Json<DataResponse<QuotaStatus>>> {
    let device_id = params.device_id.unwrap_or_default();
    validate_device_id(&device_id)?;

    let period = quota::period_label(Utc::now());
    let limit = state.config.pipeline.free_generations_per_month;
    let current = QuotaRepo::find(&state.pool, &device_id, &ip_address, &period)
        .await?
        .map(|counter| counter.count);
    let in_flight = JobRepo::count_active_free(&state.pool, &device_id, &ip_address).await?;
    let reserved = current
        .unwrap_or(0)
        .saturating_add(i32::try_from(in_flight).unwrap_or(i32::MAX));

    Ok(Json(DataResponse {
        data: QuotaStatus {
            period,
            limit,
            used: current.unwrap_or(0),
            in_flight,
            remaining: quota::remaining(Some(reserved), limit),
        },
    }))
}
