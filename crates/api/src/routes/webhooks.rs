//! Route definitions for inbound webhooks. Neither route takes a Bearer
//! token; payment confirmations carry their own signature.

use axum::routing::post;
use axum::Router;

use crate::handlers::webhooks;
use crate::state::AppState;

/// Routes mounted at `/webhooks`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/provider", post(webhooks::provider_notification))
        .route("/payments", post(webhooks::payment_confirmation))
}
