//! Route definitions for the `/credits` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::credits;
use crate::state::AppState;

/// Routes mounted at `/credits`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/packs", get(credits::list_packs))
        .route("/balance", get(credits::get_balance))
}
