use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the SSE hub.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::stream,
        crate::routes::control::list_clients,
        crate::routes::control::get_client,
        crate::routes::control::disconnect_client,
        crate::routes::control::send_to_client,
        crate::routes::control::broadcast,
        crate::routes::control::list_groups,
        crate::routes::control::group_clients,
        crate::routes::control::add_to_group,
        crate::routes::control::remove_from_group,
        crate::routes::control::change_reconnect_interval,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::control::ClientSummary,
            crate::dto::control::GroupSummary,
            crate::dto::control::EventRequest,
            crate::dto::control::BroadcastRequest,
            crate::dto::control::ReconnectIntervalRequest,
            crate::dto::control::MembershipOutcome,
            crate::dto::control::MembershipResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events stream"),
        (name = "control", description = "Client, group and broadcast management"),
    )
)]
pub struct ApiDoc;
