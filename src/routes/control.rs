use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::control::{
        BroadcastRequest, ClientSummary, EventRequest, GroupSummary, MembershipResponse,
        ReconnectIntervalRequest,
    },
    error::AppError,
    services::control_service,
    state::SharedState,
};

const CONTROL_TOKEN_HEADER: &str = "x-control-token";

/// Management endpoints for inspecting clients, groups and pushing events.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/clients", get(list_clients))
        .route("/clients/{id}", get(get_client))
        .route("/clients/{id}/disconnect", post(disconnect_client))
        .route("/clients/{id}/events", post(send_to_client))
        .route("/events", post(broadcast))
        .route("/groups", get(list_groups))
        .route("/groups/{name}/clients", get(group_clients))
        .route(
            "/groups/{name}/clients/{id}",
            put(add_to_group).delete(remove_from_group),
        )
        .route("/reconnect-interval", put(change_reconnect_interval))
        .route_layer(middleware::from_fn_with_state(state, require_control_token))
}

/// List every connected client.
#[utoipa::path(
    get,
    path = "/clients",
    tag = "control",
    params(("X-Control-Token" = Option<String>, Header, description = "Control token, when one is configured")),
    responses((status = 200, description = "Connected clients", body = [ClientSummary]))
)]
pub async fn list_clients(State(state): State<SharedState>) -> Json<Vec<ClientSummary>> {
    Json(control_service::list_clients(&state))
}

/// Describe one connected client.
#[utoipa::path(
    get,
    path = "/clients/{id}",
    tag = "control",
    params(("X-Control-Token" = Option<String>, Header, description = "Control token, when one is configured"),
    ("id" = String, Path, description = "Client identifier")),
    responses(
        (status = 200, description = "Client", body = ClientSummary),
        (status = 404, description = "No such client")
    )
)]
pub async fn get_client(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ClientSummary>, AppError> {
    Ok(Json(control_service::get_client(&state, id)?))
}

/// Close a client's stream and refuse its next reconnect attempt.
#[utoipa::path(
    post,
    path = "/clients/{id}/disconnect",
    tag = "control",
    params(("X-Control-Token" = Option<String>, Header, description = "Control token, when one is configured"),
    ("id" = String, Path, description = "Client identifier")),
    responses(
        (status = 204, description = "Client disconnected"),
        (status = 404, description = "No such client"),
        (status = 501, description = "Server runs without stable client ids")
    )
)]
pub async fn disconnect_client(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    control_service::disconnect_client(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Send an event to a single client.
#[utoipa::path(
    post,
    path = "/clients/{id}/events",
    tag = "control",
    params(("X-Control-Token" = Option<String>, Header, description = "Control token, when one is configured"),
    ("id" = String, Path, description = "Client identifier")),
    request_body = EventRequest,
    responses(
        (status = 204, description = "Event written"),
        (status = 404, description = "No such client"),
        (status = 409, description = "Client disconnected before the write")
    )
)]
pub async fn send_to_client(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<EventRequest>>,
) -> Result<StatusCode, AppError> {
    control_service::send_to_client(&state, id, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Broadcast an event.
#[utoipa::path(
    post,
    path = "/events",
    tag = "control",
    params(("X-Control-Token" = Option<String>, Header, description = "Control token, when one is configured")),
    request_body = BroadcastRequest,
    responses((status = 204, description = "Event delivered to every selected client"))
)]
pub async fn broadcast(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<BroadcastRequest>>,
) -> Result<StatusCode, AppError> {
    control_service::broadcast(&state, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List groups.
#[utoipa::path(
    get,
    path = "/groups",
    tag = "control",
    params(("X-Control-Token" = Option<String>, Header, description = "Control token, when one is configured")),
    responses((status = 200, description = "Groups and member counts", body = [GroupSummary]))
)]
pub async fn list_groups(State(state): State<SharedState>) -> Json<Vec<GroupSummary>> {
    Json(control_service::list_groups(&state))
}

/// List the members of a group.
#[utoipa::path(
    get,
    path = "/groups/{name}/clients",
    tag = "control",
    params(("X-Control-Token" = Option<String>, Header, description = "Control token, when one is configured"),
    ("name" = String, Path, description = "Group name")),
    responses((status = 200, description = "Group members; empty for unknown groups", body = [ClientSummary]))
)]
pub async fn group_clients(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Json<Vec<ClientSummary>> {
    Json(control_service::group_clients(&state, &name))
}

/// Add a client to a group, creating it if needed.
#[utoipa::path(
    put,
    path = "/groups/{name}/clients/{id}",
    tag = "control",
    params(("X-Control-Token" = Option<String>, Header, description = "Control token, when one is configured"),
    ("name" = String, Path, description = "Group name"),
    ("id" = String, Path, description = "Client identifier")),
    responses(
        (status = 200, description = "Membership outcome", body = MembershipResponse),
        (status = 404, description = "No such client")
    )
)]
pub async fn add_to_group(
    State(state): State<SharedState>,
    Path((name, id)): Path<(String, Uuid)>,
) -> Result<Json<MembershipResponse>, AppError> {
    Ok(Json(control_service::add_to_group(&state, &name, id)?))
}

/// Remove a client from a group.
#[utoipa::path(
    delete,
    path = "/groups/{name}/clients/{id}",
    tag = "control",
    params(("X-Control-Token" = Option<String>, Header, description = "Control token, when one is configured"),
    ("name" = String, Path, description = "Group name"),
    ("id" = String, Path, description = "Client identifier")),
    responses(
        (status = 200, description = "Membership outcome", body = MembershipResponse),
        (status = 404, description = "No such group")
    )
)]
pub async fn remove_from_group(
    State(state): State<SharedState>,
    Path((name, id)): Path<(String, Uuid)>,
) -> Result<Json<MembershipResponse>, AppError> {
    Ok(Json(control_service::remove_from_group(&state, &name, id)?))
}

/// Change the reconnect interval advertised to clients.
#[utoipa::path(
    put,
    path = "/reconnect-interval",
    tag = "control",
    params(("X-Control-Token" = Option<String>, Header, description = "Control token, when one is configured")),
    request_body = ReconnectIntervalRequest,
    responses((status = 204, description = "Interval stored and pushed to connected clients"))
)]
pub async fn change_reconnect_interval(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<ReconnectIntervalRequest>>,
) -> Result<StatusCode, AppError> {
    control_service::change_reconnect_interval(&state, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn require_control_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.config().control_token.as_deref() else {
        return Ok(next.run(req).await);
    };

    let provided = req
        .headers()
        .get(CONTROL_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            AppError::Unauthorized("missing control token header `X-Control-Token`".into())
        })?;

    if provided == expected {
        Ok(next.run(req).await)
    } else {
        Err(AppError::Unauthorized("invalid control token".into()))
    }
}
