use std::{any::Any, fmt, sync::Arc};

use axum::http::{HeaderMap, HeaderValue, header};

/// MIME type of an SSE stream.
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";
/// Header carrying the last event id a reconnecting client saw.
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// Authenticated principal attached to a connection. Never inspected by the registry.
#[derive(Clone)]
pub struct Principal(Arc<dyn Any + Send + Sync>);

impl Principal {
    /// Wrap any value as a principal.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the principal as `T` if that is what it holds.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Principal(..)")
    }
}

/// The parts of the inbound streaming request the registry and its collaborators look at.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    headers: HeaderMap,
    principal: Option<Principal>,
}

impl RequestContext {
    /// Build a context from the request headers.
    pub fn new(headers: HeaderMap) -> Self {
        Self {
            headers,
            principal: None,
        }
    }

    /// Attach the already-authenticated principal.
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Principal, if the HTTP layer attached one.
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// First value of `name` as a string, if present and valid UTF-8.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|value: &HeaderValue| value.to_str().ok())
    }

    /// Non-blank `Last-Event-ID` sent by a reconnecting client.
    pub fn last_event_id(&self) -> Option<&str> {
        self.header_str(LAST_EVENT_ID_HEADER)
            .filter(|value| !value.trim().is_empty())
    }

    /// Whether the `Accept` header asks for an event stream.
    ///
    /// Lenient mode also admits requests without an `Accept` header and the `*/*` and
    /// `text/*` ranges. Strict mode requires `text/event-stream` to be listed explicitly.
    pub fn accepts_event_stream(&self, strict: bool) -> bool {
        let values: Vec<&HeaderValue> = self.headers.get_all(header::ACCEPT).iter().collect();
        if values.is_empty() {
            return !strict;
        }

        let mut ranges = values
            .into_iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .map(|range| {
                range
                    .split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_ascii_lowercase()
            })
            .filter(|range| !range.is_empty())
            .peekable();

        if ranges.peek().is_none() {
            return !strict;
        }

        ranges.any(|range| {
            range == EVENT_STREAM_CONTENT_TYPE || (!strict && (range == "*/*" || range == "text/*"))
        })
    }
}
