use std::sync::Arc;

use dashmap::DashMap;

use crate::sse::client::{Client, ClientId};

/// Outcome of [`Registry::add_to_group`](crate::sse::registry::Registry::add_to_group).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddToGroupResult {
    /// The group already existed.
    AddedToExistingGroup,
    /// This call created the group.
    AddedToNewGroup,
}

/// Outcome of [`Registry::remove_from_group`](crate::sse::registry::Registry::remove_from_group).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoveFromGroupResult {
    /// No group with that name exists.
    NotFoundGroup,
    /// The client was a member and has been removed.
    RemovedFromExistingGroup,
    /// The group exists but the client was not a member.
    NotInGroup,
}

/// Named set of client handles.
///
/// Membership changes are lock-free once the group exists; only creation goes through the
/// registry's creation lock.
#[derive(Debug)]
pub struct Group {
    name: String,
    members: DashMap<ClientId, Arc<Client>>,
}

impl Group {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: DashMap::new(),
        }
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: ClientId) -> bool {
        self.members.contains_key(&id)
    }

    /// Point-in-time copy of the members.
    pub fn snapshot(&self) -> Vec<Arc<Client>> {
        self.members
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub(crate) fn insert(&self, client: &Arc<Client>) {
        self.members.insert(client.id(), client.clone());
    }

    pub(crate) fn remove(&self, id: ClientId) -> bool {
        self.members.remove(&id).is_some()
    }

    /// Remove `client` only if the member stored under its id is that very handle.
    pub(crate) fn remove_handle(&self, client: &Arc<Client>) -> bool {
        self.members
            .remove_if(&client.id(), |_, member| Arc::ptr_eq(member, client))
            .is_some()
    }
}
