//! Route definitions for the `/generations` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::generations;
use crate::state::AppState;

/// Routes mounted at `/generations`.
///
/// ```text
/// GET    /          -> list_generations
/// POST   /free      -> create_free
/// POST   /paid      -> create_paid
/// GET    /{id}      -> get_generation
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(generations::list_generations))
        .route("/free", post(generations::create_free))
        .route("/paid", post(generations::create_paid))
        .route("/{id}", get(generations::get_generation))
}
