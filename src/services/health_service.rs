use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether streams are accepted and how many are open.
pub fn health_status(state: &SharedState) -> HealthResponse {
    let clients = state.registry().client_count();
    if state.shutdown_token().is_cancelled() {
        HealthResponse::shutting_down(clients)
    } else {
        HealthResponse::ok(clients)
    }
}
