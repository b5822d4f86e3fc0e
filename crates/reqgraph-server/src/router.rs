//! Router assembly for the graph HTTP API.
//!
//! [`build_router`] wires the three endpoints with CORS and tracing
//! middleware layers. Routes use axum 0.8 `/{param}` path syntax; a bare
//! `/graph` (no id segment) answers 400 rather than falling through to a
//! 404.

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Builds the axum router with all API routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/graphs", get(handlers::list_graphs))
        .route(
            "/graph",
            get(handlers::missing_id).post(handlers::missing_id),
        )
        .route(
            "/graph/{id}",
            get(handlers::get_graph).post(handlers::post_graph),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
