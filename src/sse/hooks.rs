//! Synchronous extension points run in-line on the accept and teardown paths.

use std::{fmt, sync::Arc};

use regex::Regex;

use crate::sse::{
    client::{Client, ClientId},
    registry::Registry,
    request::RequestContext,
};

/// Arguments of an `on_connecting` hook. Setting [`drop_connection`](Self::drop_connection)
/// aborts the handshake before the stream is accepted.
pub struct ConnectingArgs<'a> {
    /// Request being admitted.
    pub request: &'a RequestContext,
    /// Handle that will represent the connection if it is admitted.
    pub client: &'a Arc<Client>,
    drop_connection: bool,
}

impl<'a> ConnectingArgs<'a> {
    pub(crate) fn new(request: &'a RequestContext, client: &'a Arc<Client>) -> Self {
        Self {
            request,
            client,
            drop_connection: false,
        }
    }

    /// Refuse the connection.
    pub fn drop_connection(&mut self) {
        self.drop_connection = true;
    }

    /// Whether a hook refused the connection.
    pub fn is_dropped(&self) -> bool {
        self.drop_connection
    }
}

/// Arguments of `on_connect` and `on_reconnect` hooks.
pub struct ConnectedArgs<'a> {
    /// Registry the client is joining.
    pub registry: &'a Registry,
    /// Request that opened the stream.
    pub request: &'a RequestContext,
    /// The admitted client.
    pub client: &'a Arc<Client>,
    /// `Last-Event-ID` presented by a reconnecting client.
    pub last_event_id: Option<&'a str>,
}

impl ConnectedArgs<'_> {
    /// Copy the header `name` into the client's properties under the same name.
    ///
    /// Multiple values are joined with `", "`. Returns whether a property was written.
    pub fn add_property_from_header(&self, name: &str, overwrite: bool) -> bool {
        match joined_header(self.request, name) {
            Some(value) => self.client.set_property(name, value, overwrite),
            None => false,
        }
    }

    /// Copy every header whose (lowercase) name matches `pattern` into the client's properties.
    ///
    /// Returns how many properties were written.
    pub fn add_properties_from_headers(&self, pattern: &Regex, overwrite: bool) -> usize {
        self.request
            .headers()
            .keys()
            .filter(|name| pattern.is_match(name.as_str()))
            .filter(|name| self.add_property_from_header(name.as_str(), overwrite))
            .count()
    }
}

/// Arguments of `on_disconnect` hooks.
pub struct DisconnectedArgs<'a> {
    /// Registry the client left.
    pub registry: &'a Registry,
    /// Request that opened the stream.
    pub request: &'a RequestContext,
    /// The departed client; already marked disconnected.
    pub client: &'a Arc<Client>,
}

type ConnectingHook = Box<dyn Fn(&mut ConnectingArgs<'_>) + Send + Sync>;
type ConnectedHook = Box<dyn Fn(&ConnectedArgs<'_>) + Send + Sync>;
type DisconnectedHook = Box<dyn Fn(&DisconnectedArgs<'_>) + Send + Sync>;

/// Registered lifecycle callbacks, invoked in registration order.
#[derive(Default)]
pub struct Hooks {
    connecting: Vec<ConnectingHook>,
    connect: Vec<ConnectedHook>,
    reconnect: Vec<ConnectedHook>,
    disconnect: Vec<DisconnectedHook>,
}

impl Hooks {
    /// Run before the stream is accepted.
    pub fn on_connecting<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ConnectingArgs<'_>) + Send + Sync + 'static,
    {
        self.connecting.push(Box::new(hook));
        self
    }

    /// Run when a client without a `Last-Event-ID` is admitted.
    pub fn on_connect<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ConnectedArgs<'_>) + Send + Sync + 'static,
    {
        self.connect.push(Box::new(hook));
        self
    }

    /// Run when a client presenting a `Last-Event-ID` is admitted.
    pub fn on_reconnect<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ConnectedArgs<'_>) + Send + Sync + 'static,
    {
        self.reconnect.push(Box::new(hook));
        self
    }

    /// Run after a client has been removed from the registry.
    pub fn on_disconnect<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DisconnectedArgs<'_>) + Send + Sync + 'static,
    {
        self.disconnect.push(Box::new(hook));
        self
    }

    pub(crate) fn run_connecting(&self, args: &mut ConnectingArgs<'_>) {
        for hook in &self.connecting {
            hook(args);
        }
    }

    pub(crate) fn run_connected(&self, args: &ConnectedArgs<'_>) {
        let hooks = if args.last_event_id.is_some() {
            &self.reconnect
        } else {
            &self.connect
        };
        for hook in hooks {
            hook(args);
        }
    }

    pub(crate) fn run_disconnected(&self, args: &DisconnectedArgs<'_>) {
        for hook in &self.disconnect {
            hook(args);
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("connecting", &self.connecting.len())
            .field("connect", &self.connect.len())
            .field("reconnect", &self.reconnect.len())
            .field("disconnect", &self.disconnect.len())
            .finish()
    }
}

/// Notification published on the registry's lifecycle channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A client was admitted.
    Connected {
        /// Id of the client.
        client_id: ClientId,
        /// `Last-Event-ID` presented on reconnect.
        last_event_id: Option<String>,
    },
    /// A client was removed.
    Disconnected {
        /// Id of the client.
        client_id: ClientId,
    },
}

fn joined_header(request: &RequestContext, name: &str) -> Option<String> {
    let values: Vec<&str> = request
        .headers()
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    (!values.is_empty()).then(|| values.join(", "))
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue};
    use uuid::Uuid;

    use super::*;
    use crate::sse::{client::tests::RecordingSink, registry::RegistryBuilder};

    fn request() -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.append("x-tenant", HeaderValue::from_static("acme"));
        headers.append("x-role", HeaderValue::from_static("admin"));
        headers.append("x-role", HeaderValue::from_static("ops"));
        headers.append("accept", HeaderValue::from_static("text/event-stream"));
        RequestContext::new(headers)
    }

    fn client() -> Arc<Client> {
        Arc::new(Client::new(
            Uuid::new_v4(),
            None,
            Box::new(RecordingSink::default()),
            false,
        ))
    }

    #[test]
    fn header_properties_are_copied() {
        let registry = RegistryBuilder::new().build().expect("registry");
        let request = request();
        let client = client();
        let args = ConnectedArgs {
            registry: &registry,
            request: &request,
            client: &client,
            last_event_id: None,
        };

        assert!(args.add_property_from_header("x-tenant", false));
        assert!(!args.add_property_from_header("x-missing", false));
        assert_eq!(
            client.get_property::<String>("x-tenant").as_deref().map(String::as_str),
            Some("acme")
        );

        let pattern = Regex::new("^x-").expect("regex");
        assert_eq!(args.add_properties_from_headers(&pattern, true), 2);
        assert_eq!(
            client.get_property::<String>("x-role").as_deref().map(String::as_str),
            Some("admin, ops")
        );
        assert!(client.get_property::<String>("accept").is_none());
    }

    #[test]
    fn connected_hooks_split_on_last_event_id() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let connects = Arc::new(AtomicUsize::new(0));
        let reconnects = Arc::new(AtomicUsize::new(0));
        let hooks = Hooks::default()
            .on_connect({
                let connects = connects.clone();
                move |_| {
                    connects.fetch_add(1, Ordering::SeqCst);
                }
            })
            .on_reconnect({
                let reconnects = reconnects.clone();
                move |args| {
                    assert_eq!(args.last_event_id, Some("41"));
                    reconnects.fetch_add(1, Ordering::SeqCst);
                }
            });

        let registry = RegistryBuilder::new().build().expect("registry");
        let request = request();
        let client = client();
        hooks.run_connected(&ConnectedArgs {
            registry: &registry,
            request: &request,
            client: &client,
            last_event_id: None,
        });
        hooks.run_connected(&ConnectedArgs {
            registry: &registry,
            request: &request,
            client: &client,
            last_event_id: Some("41"),
        });

        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(reconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn connecting_hooks_run_in_order_and_can_drop() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let hooks = Hooks::default()
            .on_connecting({
                let seen = seen.clone();
                move |_| seen.lock().expect("lock").push(1)
            })
            .on_connecting({
                let seen = seen.clone();
                move |args| {
                    seen.lock().expect("lock").push(2);
                    args.drop_connection();
                }
            });

        let request = request();
        let client = client();
        let mut args = ConnectingArgs::new(&request, &client);
        hooks.run_connecting(&mut args);

        assert!(args.is_dropped());
        assert_eq!(*seen.lock().expect("lock"), vec![1, 2]);
    }
}
