use axum::Router;

use crate::state::SharedState;

/// Control API routes.
pub mod control;
/// Swagger UI and OpenAPI document routes.
pub mod docs;
/// Health check route.
pub mod health;
/// Event stream route.
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(control::router(state.clone()));

    api_router.merge(docs::router()).with_state(state)
}
