use std::{convert::Infallible, io};

use async_stream::stream;
use axum::{
    body::Body,
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    sse::{
        handshake::{self, Admission},
        request::{EVENT_STREAM_CONTENT_TYPE, RequestContext},
        sink::{ChannelSink, SinkReceiver},
    },
    state::SharedState,
};

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Run the handshake for a streaming request and turn the outcome into a response.
///
/// An accepted stream gets its own task waiting for the connection to end; the response body
/// is fed from the client's sink until either side closes it or the server shuts down.
pub async fn open_stream(state: &SharedState, request: RequestContext) -> Response {
    if state.shutdown_token().is_cancelled() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let (sink, receiver) = ChannelSink::new(state.config().channel_capacity);
    match handshake::accept(state.registry(), request, Box::new(sink)).await {
        Admission::Accepted(session) => {
            debug!(client_id = %session.client().id(), "event stream opened");
            tokio::spawn(session.run());
            event_stream_response(receiver, state.shutdown_token().clone())
        }
        Admission::NotEventStream => StatusCode::NOT_ACCEPTABLE.into_response(),
        Admission::NoContent => StatusCode::NO_CONTENT.into_response(),
        Admission::Dropped => {
            info!("aborting dropped connection");
            aborted_response()
        }
    }
}

/// Streaming response whose body yields every frame written to the client's sink.
fn event_stream_response(mut receiver: SinkReceiver, shutdown: CancellationToken) -> Response {
    let frames = stream! {
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => None,
                frame = receiver.recv() => frame,
            };
            match next {
                Some(bytes) => yield Ok::<Bytes, Infallible>(bytes),
                None => break,
            }
        }
    };

    (
        [
            (header::CONTENT_TYPE, EVENT_STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING, "no"),
            (header::CONTENT_ENCODING, "identity"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

/// Response for a connection refused by an `on_connecting` hook.
///
/// The body fails before producing a byte, so hyper tears the connection down. Hyper may
/// already have written the head by then, so the head itself says `403` and asks for the
/// connection to be closed rather than carrying an implicit `200`.
fn aborted_response() -> Response {
    let body = futures::stream::once(async {
        Err::<Bytes, io::Error>(io::Error::new(
            io::ErrorKind::ConnectionAborted,
            "connection dropped",
        ))
    });
    (
        StatusCode::FORBIDDEN,
        [(header::CONNECTION, "close")],
        Body::from_stream(body),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn aborted_response_refuses_and_fails_its_body() {
        let response = aborted_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers().get(header::CONNECTION).unwrap(), "close");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await;
        assert!(body.is_err());
    }
}
