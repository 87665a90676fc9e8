//! Admin endpoints under the reserved `/_interceptor/` prefix.
//!
//! These routes are registered ahead of the proxy fallback and never reach
//! provider classification.

pub mod handlers;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::proxy::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route("/sessions", get(handlers::sessions))
        .route(
            "/interactions",
            get(handlers::list_interactions).delete(handlers::clear_interactions),
        )
        .route("/interactions/{id}", get(handlers::get_interaction))
}
