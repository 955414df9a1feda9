use axum::{
    Router,
    extract::State,
    http::HeaderMap,
    response::Response,
    routing::get,
};

use crate::{services::stream_service, sse::request::RequestContext, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse",
    tag = "sse",
    params(
        ("Last-Event-ID" = Option<String>, Header, description = "Id of the last event seen before reconnecting"),
        ("X-SSE-Groups" = Option<String>, Header, description = "Comma-separated groups to join on connect")
    ),
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream", body = String),
        (status = 204, description = "Client was disconnected by the server and may not reconnect yet"),
        (status = 403, description = "Refused by admission control; the connection is aborted without a body"),
        (status = 406, description = "The Accept header does not allow text/event-stream"),
        (status = 503, description = "Server is shutting down")
    )
)]
/// Open a Server-Sent Events stream and register it with the connection registry.
pub async fn stream(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    stream_service::open_stream(&state, RequestContext::new(headers)).await
}

/// Configure the SSE endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse", get(stream))
}
