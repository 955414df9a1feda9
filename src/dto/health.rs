use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "shutting_down").
    pub status: String,
    /// Number of currently registered streams.
    pub clients: usize,
}

impl HealthResponse {
    /// The service accepts streams.
    pub fn ok(clients: usize) -> Self {
        Self {
            status: "ok".to_string(),
            clients,
        }
    }

    /// Shutdown has started; streams are being closed.
    pub fn shutting_down(clients: usize) -> Self {
        Self {
            status: "shutting_down".to_string(),
            clients,
        }
    }
}
