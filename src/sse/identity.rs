//! Client identity and the one-shot no-reconnect set.
//!
//! Forced disconnects only make sense when a reconnecting client can be recognised, so the
//! defaults here mint a fresh id per connection and remember nothing.

use dashmap::DashSet;
use futures::{FutureExt, future::BoxFuture};
use uuid::Uuid;

use crate::sse::{client::ClientId, request::RequestContext};

/// Derives the id of a connecting client from its request.
pub trait ClientIdProvider: Send + Sync {
    /// Id for the client making `request`.
    fn acquire_client_id(&self, request: &RequestContext) -> ClientId;

    /// The connection for `id` ended without being forcibly disconnected.
    fn release_client_id(&self, id: ClientId, request: &RequestContext);
}

/// Ids of clients that must not reconnect, consumed on the next attempt.
pub trait NoReconnectStore: Send + Sync {
    /// Block `id` from its next reconnect.
    fn add(&self, id: ClientId) -> BoxFuture<'static, ()>;
    /// Whether `id` is currently blocked.
    fn contains(&self, id: ClientId) -> BoxFuture<'static, bool>;
    /// Lift the block on `id`.
    fn remove(&self, id: ClientId) -> BoxFuture<'static, ()>;
}

/// Every connection is a new anonymous client.
#[derive(Clone, Copy, Debug, Default)]
pub struct NewUuidClientIdProvider;

impl ClientIdProvider for NewUuidClientIdProvider {
    fn acquire_client_id(&self, _request: &RequestContext) -> ClientId {
        Uuid::new_v4()
    }

    fn release_client_id(&self, _id: ClientId, _request: &RequestContext) {}
}

/// Reads a UUID from a request header so a client keeps its id across reconnects.
///
/// Requests without a parseable header get a fresh UUID.
#[derive(Clone, Debug)]
pub struct HeaderClientIdProvider {
    header: String,
}

impl HeaderClientIdProvider {
    /// Provider reading ids from `header`.
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into().to_ascii_lowercase(),
        }
    }

    /// Header the id is read from.
    pub fn header(&self) -> &str {
        &self.header
    }
}

impl ClientIdProvider for HeaderClientIdProvider {
    fn acquire_client_id(&self, request: &RequestContext) -> ClientId {
        request
            .header_str(&self.header)
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .unwrap_or_else(Uuid::new_v4)
    }

    fn release_client_id(&self, _id: ClientId, _request: &RequestContext) {}
}

/// Store that never remembers anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpNoReconnectStore;

impl NoReconnectStore for NoOpNoReconnectStore {
    fn add(&self, _id: ClientId) -> BoxFuture<'static, ()> {
        async {}.boxed()
    }

    fn contains(&self, _id: ClientId) -> BoxFuture<'static, bool> {
        async { false }.boxed()
    }

    fn remove(&self, _id: ClientId) -> BoxFuture<'static, ()> {
        async {}.boxed()
    }
}

/// Process-local no-reconnect set.
#[derive(Debug, Default)]
pub struct InMemoryNoReconnectStore {
    ids: DashSet<ClientId>,
}

impl InMemoryNoReconnectStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ids currently blocked.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no id is blocked.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl NoReconnectStore for InMemoryNoReconnectStore {
    fn add(&self, id: ClientId) -> BoxFuture<'static, ()> {
        self.ids.insert(id);
        async {}.boxed()
    }

    fn contains(&self, id: ClientId) -> BoxFuture<'static, bool> {
        let found = self.ids.contains(&id);
        async move { found }.boxed()
    }

    fn remove(&self, id: ClientId) -> BoxFuture<'static, ()> {
        self.ids.remove(&id);
        async {}.boxed()
    }
}
