//! The connection registry: who is connected, which groups they are in, and fan-out.

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::sse::{
    client::{Client, ClientId},
    error::{SseError, SseResult},
    event::ServerSentEvent,
    frame::{self, Frame},
    group::{AddToGroupResult, Group, RemoveFromGroupResult},
    hooks::{Hooks, LifecycleEvent},
    identity::{ClientIdProvider, NewUuidClientIdProvider, NoOpNoReconnectStore, NoReconnectStore},
    options::{OptionsError, SseOptions},
};

const LIFECYCLE_CHANNEL_CAPACITY: usize = 256;

/// Predicate narrowing the clients a broadcast reaches.
pub type ClientPredicate<'a> = &'a (dyn Fn(&Client) -> bool + Send + Sync);

/// Selects the recipients of a broadcast: a group or every client, optionally filtered.
#[derive(Clone, Copy, Default)]
pub struct Audience<'a> {
    group: Option<&'a str>,
    predicate: Option<ClientPredicate<'a>>,
}

impl<'a> Audience<'a> {
    /// Every connected client.
    pub fn all() -> Self {
        Self::default()
    }

    /// Connected members of `name`. An unknown group selects nobody.
    pub fn group(name: &'a str) -> Self {
        Self {
            group: Some(name),
            predicate: None,
        }
    }

    /// Keep only clients for which `predicate` holds.
    pub fn matching(mut self, predicate: ClientPredicate<'a>) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

impl fmt::Debug for Audience<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Audience")
            .field("group", &self.group)
            .field("filtered", &self.predicate.is_some())
            .finish()
    }
}

/// Assembles a [`Registry`].
///
/// Forced disconnects are only supported when both a client id provider and a no-reconnect
/// store are supplied.
#[derive(Default)]
pub struct RegistryBuilder {
    options: SseOptions,
    id_provider: Option<Arc<dyn ClientIdProvider>>,
    no_reconnect_store: Option<Arc<dyn NoReconnectStore>>,
    hooks: Hooks,
}

impl RegistryBuilder {
    /// Builder with default options, no collaborators and no hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry-wide settings.
    pub fn options(mut self, options: SseOptions) -> Self {
        self.options = options;
        self
    }

    /// How connecting clients are identified.
    pub fn client_id_provider(mut self, provider: Arc<dyn ClientIdProvider>) -> Self {
        self.id_provider = Some(provider);
        self
    }

    /// Where ids of forcibly disconnected clients are remembered.
    pub fn no_reconnect_store(mut self, store: Arc<dyn NoReconnectStore>) -> Self {
        self.no_reconnect_store = Some(store);
        self
    }

    /// Lifecycle callbacks.
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Validate the options and build the registry.
    pub fn build(self) -> Result<Registry, OptionsError> {
        self.options.validate()?;

        let disconnect_supported = self.id_provider.is_some() && self.no_reconnect_store.is_some();
        let (lifecycle, _) = broadcast::channel(LIFECYCLE_CHANNEL_CAPACITY);

        Ok(Registry {
            clients: DashMap::new(),
            groups: DashMap::new(),
            group_creation: Mutex::new(()),
            reconnect_interval: watch::Sender::new(self.options.reconnect_interval),
            options: self.options,
            id_provider: self
                .id_provider
                .unwrap_or_else(|| Arc::new(NewUuidClientIdProvider)),
            no_reconnect_store: self
                .no_reconnect_store
                .unwrap_or_else(|| Arc::new(NoOpNoReconnectStore)),
            disconnect_supported,
            hooks: self.hooks,
            lifecycle,
        })
    }
}

/// Registry of open SSE connections.
///
/// Lookups return snapshots; writes never happen while a map shard is locked.
pub struct Registry {
    clients: DashMap<ClientId, Arc<Client>>,
    groups: DashMap<String, Arc<Group>>,
    group_creation: Mutex<()>,
    reconnect_interval: watch::Sender<Option<u32>>,
    options: SseOptions,
    id_provider: Arc<dyn ClientIdProvider>,
    no_reconnect_store: Arc<dyn NoReconnectStore>,
    disconnect_supported: bool,
    hooks: Hooks,
    lifecycle: broadcast::Sender<LifecycleEvent>,
}

impl Registry {
    /// Settings the registry was built with.
    pub fn options(&self) -> &SseOptions {
        &self.options
    }

    /// Whether [`Client::disconnect`] can be used on this registry's clients.
    pub fn disconnect_supported(&self) -> bool {
        self.disconnect_supported
    }

    /// Receive connect/disconnect notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }

    /// Registered client with `id`.
    pub fn get_client(&self, id: ClientId) -> Option<Arc<Client>> {
        self.clients.get(&id).map(|entry| entry.value().clone())
    }

    /// Snapshot of every registered client.
    pub fn get_clients(&self) -> Vec<Arc<Client>> {
        self.clients
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Snapshot of the members of `name`; empty if the group does not exist.
    pub fn get_group_clients(&self, name: &str) -> Vec<Arc<Client>> {
        self.group(name)
            .map(|group| group.snapshot())
            .unwrap_or_default()
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Names of all groups, sorted.
    pub fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Add `client` to `name`, creating the group on first use.
    ///
    /// Concurrent calls racing on a new name create exactly one group.
    pub fn add_to_group(&self, name: &str, client: &Arc<Client>) -> AddToGroupResult {
        let result = loop {
            if let Some(group) = self.group(name) {
                group.insert(client);
                if self.is_registered(name, &group) {
                    break AddToGroupResult::AddedToExistingGroup;
                }
                // The group was pruned between the lookup and the insert.
                group.remove_handle(client);
                continue;
            }

            let _creation = self
                .group_creation
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.groups.contains_key(name) {
                continue;
            }
            let group = Arc::new(Group::new(name));
            group.insert(client);
            self.groups.insert(name.to_string(), group);
            debug!(group = %name, "group created");
            break AddToGroupResult::AddedToNewGroup;
        };

        // Lost a race with remove_client: it flips `connected` before purging groups.
        if !client.is_connected() {
            if let Some(group) = self.group(name) {
                if group.remove_handle(client) {
                    self.prune_group(name);
                }
            }
        }

        debug!(client_id = %client.id(), group = %name, "client added to group");
        result
    }

    /// Remove the client `id` from `name`. A group left empty is dropped.
    pub fn remove_from_group(&self, name: &str, id: ClientId) -> RemoveFromGroupResult {
        match self.group(name) {
            None => RemoveFromGroupResult::NotFoundGroup,
            Some(group) if group.remove(id) => {
                debug!(client_id = %id, group = %name, "client removed from group");
                if group.is_empty() {
                    self.prune_group(name);
                }
                RemoveFromGroupResult::RemovedFromExistingGroup
            }
            Some(_) => RemoveFromGroupResult::NotInGroup,
        }
    }

    /// Reconnect interval currently advertised to new clients, in milliseconds.
    pub fn reconnect_interval(&self) -> Option<u32> {
        *self.reconnect_interval.borrow()
    }

    /// Advertise `interval_ms` to new clients and push a `retry:` frame to the audience.
    pub async fn change_reconnect_interval(
        &self,
        interval_ms: u32,
        audience: &Audience<'_>,
        cancel: Option<&CancellationToken>,
    ) -> SseResult<()> {
        self.reconnect_interval.send_replace(Some(interval_ms));
        info!(interval_ms, "reconnect interval changed");
        self.send_frame(&frame::encode_retry(interval_ms), audience, cancel)
            .await
    }

    /// Broadcast a single-line `data:` event.
    pub async fn send_text(
        &self,
        text: &str,
        audience: &Audience<'_>,
        cancel: Option<&CancellationToken>,
    ) -> SseResult<()> {
        self.send_frame(&frame::encode_text(text), audience, cancel)
            .await
    }

    /// Broadcast an event.
    pub async fn send_event(
        &self,
        event: &ServerSentEvent,
        audience: &Audience<'_>,
        cancel: Option<&CancellationToken>,
    ) -> SseResult<()> {
        self.send_frame(&frame::encode_event(event), audience, cancel)
            .await
    }

    /// Write `frame` to every connected client in `audience`, concurrently.
    ///
    /// Per-client failures are logged and do not fail the broadcast. Returns
    /// [`SseError::Cancelled`] when `cancel` fired before every send completed.
    pub async fn send_frame(
        &self,
        frame: &Frame,
        audience: &Audience<'_>,
        cancel: Option<&CancellationToken>,
    ) -> SseResult<()> {
        if is_cancelled(cancel) {
            return Err(SseError::Cancelled);
        }

        let targets = self.select(audience);
        if targets.is_empty() {
            return Ok(());
        }

        let deliveries = targets.iter().map(|client| async move {
            match client.send(frame, cancel).await {
                Ok(()) | Err(SseError::Cancelled) => {}
                Err(SseError::NotConnected) => {
                    debug!(client_id = %client.id(), "skipped client that disconnected mid-broadcast")
                }
                Err(err) => debug!(client_id = %client.id(), error = %err, "delivery failed"),
            }
        });
        join_all(deliveries).await;

        if is_cancelled(cancel) {
            return Err(SseError::Cancelled);
        }
        Ok(())
    }

    pub(crate) fn id_provider(&self) -> &dyn ClientIdProvider {
        self.id_provider.as_ref()
    }

    pub(crate) fn no_reconnect_store(&self) -> &dyn NoReconnectStore {
        self.no_reconnect_store.as_ref()
    }

    pub(crate) fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub(crate) fn notify(&self, event: LifecycleEvent) {
        // No subscribers is fine.
        let _ = self.lifecycle.send(event);
    }

    /// Register `client`. A live handle already registered under the same id is ended and
    /// purged from its groups; its session then tears it down.
    pub(crate) fn add_client(&self, client: Arc<Client>) {
        let id = client.id();
        if let Some(previous) = self.clients.insert(id, client.clone()) {
            if !Arc::ptr_eq(&previous, &client) {
                warn!(client_id = %id, "client id reused; ending the previous stream");
                previous.supersede();
                self.purge_groups(&previous);
            }
        }
        info!(client_id = %id, "client connected");
    }

    /// Mark `client` disconnected, then drop it from the client map and every group.
    pub(crate) async fn remove_client(&self, client: &Arc<Client>) {
        client.mark_disconnected().await;

        let id = client.id();
        self.clients
            .remove_if(&id, |_, registered| Arc::ptr_eq(registered, client));
        self.purge_groups(client);
        info!(client_id = %id, "client removed");
    }

    fn purge_groups(&self, client: &Arc<Client>) {
        let groups: Vec<Arc<Group>> = self
            .groups
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for group in groups {
            if group.remove_handle(client) && group.is_empty() {
                self.prune_group(group.name());
            }
        }
    }

    /// Drop `name` if it has no members. Runs under the creation lock so it cannot interleave
    /// with the creation of a group under the same name.
    fn prune_group(&self, name: &str) {
        let _creation = self
            .group_creation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self
            .groups
            .remove_if(name, |_, group| group.is_empty())
            .is_some()
        {
            debug!(group = %name, "empty group removed");
        }
    }

    fn is_registered(&self, name: &str, group: &Arc<Group>) -> bool {
        self.groups
            .get(name)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), group))
    }

    fn group(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.get(name).map(|entry| entry.value().clone())
    }

    fn select(&self, audience: &Audience<'_>) -> Vec<Arc<Client>> {
        let candidates = match audience.group {
            Some(name) => self.get_group_clients(name),
            None => self.get_clients(),
        };
        candidates
            .into_iter()
            .filter(|client| client.is_connected())
            .filter(|client| {
                audience
                    .predicate
                    .is_none_or(|predicate| predicate(client.as_ref()))
            })
            .collect()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("clients", &self.clients.len())
            .field("groups", &self.groups.len())
            .field("options", &self.options)
            .field("disconnect_supported", &self.disconnect_supported)
            .finish_non_exhaustive()
    }
}

fn is_cancelled(cancel: Option<&CancellationToken>) -> bool {
    cancel.is_some_and(CancellationToken::is_cancelled)
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, time::Duration};

    use uuid::Uuid;

    use super::*;
    use crate::sse::client::tests::RecordingSink;

    fn registry() -> Registry {
        RegistryBuilder::new().build().expect("registry")
    }

    fn connect(registry: &Registry, sink: RecordingSink) -> Arc<Client> {
        let client = Arc::new(Client::new(Uuid::new_v4(), None, Box::new(sink), false));
        registry.add_client(client.clone());
        client
    }

    #[tokio::test]
    async fn broadcast_reaches_every_client_once() {
        let registry = registry();
        let sinks: Vec<RecordingSink> = (0..25).map(|_| RecordingSink::default()).collect();
        for sink in &sinks {
            connect(&registry, sink.clone());
        }

        let event = ServerSentEvent::new().with_type("tick").with_data("1");
        registry
            .send_event(&event, &Audience::all(), None)
            .await
            .expect("broadcast");

        let expected = frame::encode_event(&event).as_bytes().to_vec();
        for sink in sinks {
            assert_eq!(sink.frames(), vec![expected.clone()]);
        }
    }

    #[tokio::test]
    async fn group_and_predicate_narrow_the_audience() {
        let registry = registry();
        let in_group = RecordingSink::default();
        let filtered_out = RecordingSink::default();
        let outside = RecordingSink::default();

        let a = connect(&registry, in_group.clone());
        let b = connect(&registry, filtered_out.clone());
        connect(&registry, outside.clone());
        registry.add_to_group("room", &a);
        registry.add_to_group("room", &b);

        let keep = a.id();
        let predicate = move |client: &Client| client.id() == keep;
        registry
            .send_text("hi", &Audience::group("room").matching(&predicate), None)
            .await
            .expect("broadcast");

        assert_eq!(in_group.frames().len(), 1);
        assert!(filtered_out.frames().is_empty());
        assert!(outside.frames().is_empty());

        registry
            .send_text("nobody", &Audience::group("missing"), None)
            .await
            .expect("broadcast to unknown group");
        assert!(registry.get_group_clients("missing").is_empty());
    }

    #[tokio::test]
    async fn slow_client_does_not_delay_the_others() {
        let registry = registry();
        let slow = RecordingSink {
            delay: Some(Duration::from_millis(300)),
            ..RecordingSink::default()
        };
        let fast = RecordingSink::default();
        connect(&registry, slow.clone());
        connect(&registry, fast.clone());

        let started = tokio::time::Instant::now();
        let everyone = Audience::all();
        let broadcast = registry.send_text("x", &everyone, None);
        tokio::pin!(broadcast);

        tokio::select! {
            _ = &mut broadcast => panic!("broadcast should wait for the slow client"),
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
        assert_eq!(fast.frames().len(), 1);
        assert!(slow.frames().is_empty());

        broadcast.await.expect("broadcast");
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(slow.frames().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_broadcast_reports_cancellation() {
        let registry = registry();
        let slow = RecordingSink {
            delay: Some(Duration::from_secs(10)),
            ..RecordingSink::default()
        };
        connect(&registry, slow.clone());

        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                token.cancel();
            })
        };

        let result = registry.send_text("x", &Audience::all(), Some(&token)).await;
        canceller.await.expect("canceller");
        assert!(matches!(result, Err(SseError::Cancelled)));
        assert!(slow.frames().is_empty());
    }

    #[tokio::test]
    async fn failing_client_does_not_fail_the_broadcast() {
        let registry = registry();
        let broken = connect(
            &registry,
            RecordingSink {
                fail: true,
                ..RecordingSink::default()
            },
        );
        let healthy = RecordingSink::default();
        connect(&registry, healthy.clone());

        registry
            .send_text("x", &Audience::all(), None)
            .await
            .expect("broadcast");
        assert_eq!(healthy.frames().len(), 1);
        assert!(!broken.is_connected());
    }

    #[tokio::test]
    async fn reconnect_interval_is_stored_and_pushed() {
        let registry = registry();
        let sink = RecordingSink::default();
        connect(&registry, sink.clone());

        assert_eq!(registry.reconnect_interval(), None);
        registry
            .change_reconnect_interval(5000, &Audience::all(), None)
            .await
            .expect("change");

        assert_eq!(registry.reconnect_interval(), Some(5000));
        assert_eq!(sink.frames(), vec![b"retry: 5000\r\n\r\n".to_vec()]);
    }

    #[tokio::test]
    async fn remove_client_purges_map_and_groups() {
        let registry = registry();
        let client = connect(&registry, RecordingSink::default());
        registry.add_to_group("a", &client);
        registry.add_to_group("b", &client);

        registry.remove_client(&client).await;

        assert!(!client.is_connected());
        assert!(registry.get_client(client.id()).is_none());
        assert!(registry.get_group_clients("a").is_empty());
        assert!(registry.get_group_clients("b").is_empty());
        assert!(registry.group_names().is_empty());
        assert_eq!(
            registry.remove_from_group("zzz", client.id()),
            RemoveFromGroupResult::NotFoundGroup
        );
    }

    #[tokio::test]
    async fn stale_handle_removal_keeps_the_newer_handle() {
        let registry = registry();
        let id = Uuid::new_v4();
        let old = Arc::new(Client::new(id, None, Box::new(RecordingSink::default()), false));
        let new = Arc::new(Client::new(id, None, Box::new(RecordingSink::default()), false));
        registry.add_client(old.clone());
        registry.add_client(new.clone());

        registry.remove_client(&old).await;

        let registered = registry.get_client(id).expect("newer handle");
        assert!(Arc::ptr_eq(&registered, &new));
    }

    #[test]
    fn add_and_remove_group_results() {
        let registry = registry();
        let client = Arc::new(Client::new(
            Uuid::new_v4(),
            None,
            Box::new(RecordingSink::default()),
            false,
        ));
        registry.add_client(client.clone());

        assert_eq!(
            registry.add_to_group("g", &client),
            AddToGroupResult::AddedToNewGroup
        );
        assert_eq!(
            registry.add_to_group("g", &client),
            AddToGroupResult::AddedToExistingGroup
        );
        assert_eq!(registry.get_group_clients("g").len(), 1);
        assert_eq!(
            registry.remove_from_group("g", client.id()),
            RemoveFromGroupResult::RemovedFromExistingGroup
        );
        assert!(registry.group_names().is_empty());
        assert_eq!(
            registry.remove_from_group("g", client.id()),
            RemoveFromGroupResult::NotFoundGroup
        );
    }

    #[test]
    fn removing_a_member_keeps_a_non_empty_group() {
        let registry = registry();
        let stays = connect(&registry, RecordingSink::default());
        let leaves = connect(&registry, RecordingSink::default());
        registry.add_to_group("g", &stays);
        registry.add_to_group("g", &leaves);

        assert_eq!(
            registry.remove_from_group("g", stays.id()),
            RemoveFromGroupResult::RemovedFromExistingGroup
        );
        assert_eq!(
            registry.remove_from_group("g", stays.id()),
            RemoveFromGroupResult::NotInGroup
        );
        assert_eq!(registry.group_names(), vec!["g".to_string()]);
    }

    #[tokio::test]
    async fn groups_disappear_with_their_last_member() {
        let registry = registry();
        let clients: Vec<Arc<Client>> = (0..50)
            .map(|_| connect(&registry, RecordingSink::default()))
            .collect();
        for (i, client) in clients.iter().enumerate() {
            registry.add_to_group(&format!("junk-{i}-a"), client);
            registry.add_to_group(&format!("junk-{i}-b"), client);
            registry.add_to_group("shared", client);
        }
        assert_eq!(registry.group_names().len(), 101);

        for client in &clients[1..] {
            registry.remove_client(client).await;
        }
        let mut expected = vec![
            "junk-0-a".to_string(),
            "junk-0-b".to_string(),
            "shared".to_string(),
        ];
        expected.sort();
        assert_eq!(registry.group_names(), expected);

        registry.remove_client(&clients[0]).await;
        assert_eq!(registry.client_count(), 0);
        assert!(registry.group_names().is_empty());
    }

    #[tokio::test]
    async fn reused_id_ends_the_previous_handle() {
        let registry = registry();
        let id = Uuid::new_v4();
        let first_sink = RecordingSink::default();
        let first = Arc::new(Client::new(id, None, Box::new(first_sink.clone()), false));
        registry.add_client(first.clone());
        registry.add_to_group("room", &first);

        let second_sink = RecordingSink::default();
        let second = Arc::new(Client::new(id, None, Box::new(second_sink.clone()), false));
        registry.add_to_group("other", &second);
        registry.add_client(second.clone());

        assert!(!first.is_connected());
        assert!(first.closing().is_cancelled());
        assert!(Arc::ptr_eq(&registry.get_client(id).expect("client"), &second));
        assert!(registry.get_group_clients("room").is_empty());
        assert!(!registry.group_names().contains(&"room".to_string()));

        registry
            .send_text("hello", &Audience::all(), None)
            .await
            .expect("broadcast");
        assert!(first_sink.frames().is_empty());
        assert_eq!(second_sink.frames().len(), 1);

        // The first session's teardown must leave the second handle alone.
        registry.remove_client(&first).await;
        assert!(first_sink.closed.is_cancelled());
        assert!(Arc::ptr_eq(&registry.get_client(id).expect("client"), &second));
        assert_eq!(registry.get_group_clients("other").len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn racing_group_creation_yields_one_group_per_name() {
        let registry = Arc::new(registry());
        let tasks: Vec<_> = (0..100)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let client = connect(&registry, RecordingSink::default());
                    let mut created = Vec::new();
                    for n in 0..10 {
                        let name = format!("g{n}");
                        if registry.add_to_group(&name, &client) == AddToGroupResult::AddedToNewGroup {
                            created.push(name);
                        }
                        tokio::task::yield_now().await;
                    }
                    created
                })
            })
            .collect();

        let mut created = Vec::new();
        for task in tasks {
            created.extend(task.await.expect("task"));
        }

        let distinct: HashSet<&String> = created.iter().collect();
        assert_eq!(created.len(), 10);
        assert_eq!(distinct.len(), 10);
        for n in 0..10 {
            assert_eq!(registry.get_group_clients(&format!("g{n}")).len(), 100);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn no_write_lands_after_removal_under_churn() {
        let registry = Arc::new(registry());
        let stop = CancellationToken::new();

        let broadcasters: Vec<_> = (0..4)
            .map(|i| {
                let registry = registry.clone();
                let stop = stop.clone();
                tokio::spawn(async move {
                    while !stop.is_cancelled() {
                        let audience = if i % 2 == 0 {
                            Audience::all()
                        } else {
                            Audience::group("churn")
                        };
                        registry
                            .send_text("tick", &audience, None)
                            .await
                            .expect("broadcast");
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        let churners: Vec<_> = (0..200)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let sink = RecordingSink::default();
                    let client = connect(&registry, sink.clone());
                    registry.add_to_group("churn", &client);
                    tokio::task::yield_now().await;
                    registry.remove_client(&client).await;
                    let written = sink.frames().len();
                    (sink, written)
                })
            })
            .collect();

        let mut observed = Vec::new();
        for churner in churners {
            observed.push(churner.await.expect("churner"));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop.cancel();
        for broadcaster in broadcasters {
            broadcaster.await.expect("broadcaster");
        }

        for (sink, written) in observed {
            assert_eq!(sink.frames().len(), written);
        }
        assert_eq!(registry.client_count(), 0);
        assert!(registry.get_group_clients("churn").is_empty());
    }
}
