//! Handlers for the `/credits` resource: pack catalog and account balance.

use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;
use studio_core::credits::{CreditPack, CREDIT_PACKS};
use studio_core::error::CoreError;
use studio_db::models::credit::CreditLedgerEntry;
use studio_db::repositories::{clamp_limit, clamp_offset, AccountRepo, CreditRepo};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CreditBalance {
    pub balance: i32,
    pub entries: Vec<CreditLedgerEntry>,
}

/// GET /api/v1/credits/packs
pub async fn list_packs() -> Json<DataResponse<&'static [CreditPack]>> {
    Json(DataResponse { data: CREDIT_PACKS })
}

/// GET /api/v1/credits/balance
///
/// Current balance and the most recent ledger entries.
pub async fn get_balance(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<DataResponse<CreditBalance>>> {
    let account = AccountRepo::find_by_id(&state.pool, auth.account_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Account",
            id: auth.account_id.to_string(),
        }))?;

    let entries = CreditRepo::list_entries(
        &state.pool,
        account.id,
        clamp_limit(params.limit),
        clamp_offset(params.offset),
    )
    .await?;

    Ok(Json(DataResponse {
        data: CreditBalance {
            balance: account.credits_balance,
            entries,
        },
    }))
}
