//! Route definitions

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .nest("/v1/petitions", petition_routes())
        .nest("/v1/kings", king_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Petition lifecycle routes
fn petition_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(handlers::submit_petition))
        .route("/:id", get(handlers::get_petition))
        .route("/:id/cosign", post(handlers::cosign_petition))
        .route("/:id/withdraw", post(handlers::withdraw_petition))
}

/// King escalation routes
fn king_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:king_id/escalations", get(handlers::get_escalation_queue))
        .route(
            "/escalations/:petition_id",
            get(handlers::get_decision_package),
        )
        .route(
            "/escalations/:petition_id/acknowledge",
            post(handlers::king_acknowledge),
        )
}
