pub mod credits;
pub mod generations;
pub mod health;
pub mod webhooks;

use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /generations/free                POST  free job (device_id + client IP)
/// /generations/paid                POST  paid job (Bearer)
/// /generations                     GET   history (Bearer)
/// /generations/{id}                GET   status (owner)
///
/// /quota                           GET   remaining free generations
///
/// /credits/packs                   GET   pack catalog
/// /credits/balance                 GET   balance + ledger (Bearer)
///
/// /webhooks/provider               POST  provider notification
/// /webhooks/payments               POST  signed purchase confirmation
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/generations", generations::router())
        .route("/quota", get(handlers::quota::get_quota))
        .nest("/credits", credits::router())
        .nest("/webhooks", webhooks::router())
}
