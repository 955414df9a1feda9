//! Admission of a streaming request into the registry and the matching teardown.

use std::{fmt, sync::Arc};

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::sse::{
    client::Client,
    frame,
    hooks::{ConnectedArgs, ConnectingArgs, DisconnectedArgs, LifecycleEvent},
    registry::Registry,
    request::RequestContext,
    sink::ResponseSink,
};

/// How a streaming request was handled.
pub enum Admission {
    /// The stream is open and registered. The caller must drive [`Session::run`].
    Accepted(Session),
    /// The `Accept` header does not ask for an event stream.
    NotEventStream,
    /// The client id is blocked from reconnecting; answer 204 without a stream.
    NoContent,
    /// An `on_connecting` hook refused the connection; abort it without a body.
    Dropped,
}

impl fmt::Debug for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Admission::Accepted(session) => f.debug_tuple("Accepted").field(session.client()).finish(),
            Admission::NotEventStream => f.write_str("NotEventStream"),
            Admission::NoContent => f.write_str("NoContent"),
            Admission::Dropped => f.write_str("Dropped"),
        }
    }
}

/// An accepted stream, alive until the peer goes away or the server disconnects it.
pub struct Session {
    registry: Arc<Registry>,
    client: Arc<Client>,
    request: RequestContext,
    closed: BoxFuture<'static, ()>,
}

impl Session {
    /// Handle of the accepted client.
    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    /// Wait for the stream to end, then unregister the client.
    pub async fn run(self) {
        let Session {
            registry,
            client,
            request,
            closed,
        } = self;

        tokio::select! {
            _ = closed => debug!(client_id = %client.id(), "client went away"),
            _ = client.closing().cancelled() => debug!(client_id = %client.id(), "stream closed by server"),
        }

        teardown(&registry, &client, &request).await;
    }
}

/// Admit `request` whose response body is fed by `sink`.
pub async fn accept(
    registry: &Arc<Registry>,
    request: RequestContext,
    sink: Box<dyn ResponseSink>,
) -> Admission {
    if !request.accepts_event_stream(registry.options().strict_accept) {
        return Admission::NotEventStream;
    }

    let id = registry.id_provider().acquire_client_id(&request);

    let store = registry.no_reconnect_store();
    if store.contains(id).await {
        store.remove(id).await;
        registry.id_provider().release_client_id(id, &request);
        info!(client_id = %id, "reconnect refused for disconnected client");
        return Admission::NoContent;
    }

    let closed = sink.closed();
    let client = Arc::new(Client::new(
        id,
        request.principal().cloned(),
        sink,
        registry.disconnect_supported(),
    ));

    let mut connecting = ConnectingArgs::new(&request, &client);
    registry.hooks().run_connecting(&mut connecting);
    if connecting.is_dropped() {
        registry.id_provider().release_client_id(id, &request);
        info!(client_id = %id, "connection dropped by connecting hook");
        return Admission::Dropped;
    }

    if let Some(interval) = registry.reconnect_interval() {
        if let Err(err) = client.send(&frame::encode_retry(interval), None).await {
            warn!(client_id = %id, error = %err, "failed to advertise reconnect interval");
        }
    }

    let last_event_id = request.last_event_id();
    registry.hooks().run_connected(&ConnectedArgs {
        registry,
        request: &request,
        client: &client,
        last_event_id,
    });
    registry.add_client(client.clone());
    registry.notify(LifecycleEvent::Connected {
        client_id: id,
        last_event_id: last_event_id.map(str::to_string),
    });

    Admission::Accepted(Session {
        registry: registry.clone(),
        client,
        request,
        closed,
    })
}

async fn teardown(registry: &Registry, client: &Arc<Client>, request: &RequestContext) {
    registry.remove_client(client).await;

    let id = client.id();
    if client.prevents_reconnect() {
        registry.no_reconnect_store().add(id).await;
        debug!(client_id = %id, "client blocked from reconnecting once");
    } else {
        registry.id_provider().release_client_id(id, request);
    }

    registry.hooks().run_disconnected(&DisconnectedArgs {
        registry,
        request,
        client,
    });
    registry.notify(LifecycleEvent::Disconnected { client_id: id });
}
