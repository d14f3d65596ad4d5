//! Handlers for the `/generations` resource.
//!
//! Free generations are anonymous and keyed by `device_id` plus the caller's
//! IP; paid generations require a Bearer token. Creation answers 202 with
//! the job as it stands after dispatch; the outcome arrives later through
//! the provider webhook or the poll fallback.
//!
//! Both creation endpoints are throttled per client address before any
//! other work is done.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use studio_core::error::CoreError;
use studio_core::generation::EditParameters;
use studio_core::types::JobId;
use studio_db::models::job::{Job, JobHistoryItem, JobOwner, JobStatusView};
use studio_db::models::status::JobStatus;
use studio_db::repositories::{clamp_limit, clamp_offset, JobRepo};
use studio_pipeline::GenerationRequest;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::client_ip::ClientIp;
use crate::query::{DeviceParams, PaginationParams};
use crate::response::{DataResponse, Page};
use crate::state::AppState;

/// Request body for both creation endpoints.
#[derive(Debug, Deserialize)]
pub struct CreateGeneration {
    pub prompt: String,
    pub image_url: String,
    pub aspect_ratio: Option<String>,
    pub resolution: Option<String>,
    /// Required for free generations, ignored for paid ones.
    pub device_id: Option<String>,
}

impl CreateGeneration {
    fn to_request(&self) -> GenerationRequest {
        GenerationRequest {
            input_ref: self.image_url.trim().to_string(),
            params: EditParameters::new(
                &self.prompt,
                self.resolution.as_deref(),
                self.aspect_ratio.as_deref(),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/v1/generations/free
pub async fn create_free(
    State(state): State<AppState>,
    ClientIp(ip_address): ClientIp,
    Json(input): Json<CreateGeneration>,
) -> AppResult<impl IntoResponse> {
    state.free_limiter.check(&ip_address)?;

    let device_id = input.device_id.clone().unwrap_or_default();
    let job = state
        .admission
        .submit_free(&device_id, &ip_address, input.to_request())
        .await?;

    Ok(accepted(&state, &job))
}

/// POST /api/v1/generations/paid
pub async fn create_paid(
    auth: AuthUser,
    State(state): State<AppState>,
    ClientIp(ip_address): ClientIp,
    Json(input): Json<CreateGeneration>,
) -> AppResult<impl IntoResponse> {
    state.paid_limiter.check(&ip_address)?;

    let job = state
        .admission
        .submit_paid(auth.account_id, input.to_request())
        .await?;

    Ok(accepted(&state, &job))
}

/// Arm the poll watchdog for a dispatched job and build the 202 response.
fn accepted(state: &AppState, job: &Job) -> (StatusCode, Json<DataResponse<JobStatusView>>) {
    if job.status() == Some(JobStatus::Processing) {
        state.reconciler.watch(job);
    }
    (
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: JobStatusView::from(job),
        }),
    )
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// GET /api/v1/generations/{id}?device_id=
///
/// Registered jobs are visible to the owning account only, anonymous jobs
/// to a caller presenting the same `device_id`. Anything else is reported
/// as not found.
pub async fn get_generation(
    auth: Option<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<JobId>,
    Query(params): Query<DeviceParams>,
) -> AppResult<Json<DataResponse<JobStatusView>>> {
    let not_found = || {
        AppError::Core(CoreError::NotFound {
            entity: "GenerationJob",
            id: id.to_string(),
        })
    };

    let job = JobRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(not_found)?;

    let visible = match job.owner() {
        Some(JobOwner::RegisteredUser(account_id)) => {
            auth.is_some_and(|user| user.account_id == account_id)
        }
        Some(JobOwner::Anonymous { device_id, .. }) => {
            params.device_id.as_deref() == Some(device_id.as_str())
        }
        None => false,
    };
    if !visible {
        return Err(not_found());
    }

    Ok(Json(DataResponse {
        data: JobStatusView::from(&job),
    }))
}

/// GET /api/v1/generations
///
/// The caller's paid generations, newest first.
pub async fn list_generations(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<DataResponse<Page<JobHistoryItem>>>> {
    let limit = clamp_limit(params.limit);
    let offset = clamp_offset(params.offset);

    let jobs = JobRepo::list_by_account(&state.pool, auth.account_id, limit, offset).await?;
    let total = JobRepo::count_by_account(&state.pool, auth.account_id).await?;

    Ok(Json(DataResponse {
        data: Page {
            items: jobs.into_iter().map(JobHistoryItem::from).collect(),
            total,
            limit,
            offset,
        },
    }))
}
