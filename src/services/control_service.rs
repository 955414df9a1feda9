use std::collections::HashSet;

use tracing::info;
use uuid::Uuid;

use crate::{
    dto::control::{
        BroadcastRequest, ClientSummary, EventRequest, GroupSummary, MembershipResponse,
        ReconnectIntervalRequest, removal_outcome,
    },
    error::ServiceError,
    sse::{
        client::Client,
        event::ServerSentEvent,
        registry::Audience,
    },
    state::SharedState,
};

/// List every registered client.
pub fn list_clients(state: &SharedState) -> Vec<ClientSummary> {
    state
        .registry()
        .get_clients()
        .iter()
        .map(|client| ClientSummary::from(client.as_ref()))
        .collect()
}

/// Describe a single client.
pub fn get_client(state: &SharedState, id: Uuid) -> Result<ClientSummary, ServiceError> {
    state
        .registry()
        .get_client(id)
        .map(|client| ClientSummary::from(client.as_ref()))
        .ok_or_else(|| client_not_found(id))
}

/// Forcibly disconnect a client and block its next reconnect.
pub async fn disconnect_client(state: &SharedState, id: Uuid) -> Result<(), ServiceError> {
    let client = state
        .registry()
        .get_client(id)
        .ok_or_else(|| client_not_found(id))?;
    client.disconnect().await?;
    info!(client_id = %id, "client disconnected through control API");
    Ok(())
}

/// Broadcast an event to every client, a group, and/or an explicit set of clients.
pub async fn broadcast(state: &SharedState, request: BroadcastRequest) -> Result<(), ServiceError> {
    let event = request.to_event();
    let BroadcastRequest {
        group, client_ids, ..
    } = request;

    let ids: Option<HashSet<Uuid>> = client_ids.map(|ids| ids.into_iter().collect());
    let in_ids = |client: &Client| ids.as_ref().is_none_or(|ids| ids.contains(&client.id()));

    let mut audience = match group.as_deref() {
        Some(name) => Audience::group(name),
        None => Audience::all(),
    };
    if ids.is_some() {
        audience = audience.matching(&in_ids);
    }

    state
        .registry()
        .send_event(&event, &audience, Some(state.shutdown_token()))
        .await?;
    Ok(())
}

/// Send an event to one client.
pub async fn send_to_client(
    state: &SharedState,
    id: Uuid,
    request: EventRequest,
) -> Result<(), ServiceError> {
    let client = state
        .registry()
        .get_client(id)
        .ok_or_else(|| client_not_found(id))?;
    client
        .send_event(&ServerSentEvent::from(request))
        .await?;
    Ok(())
}

/// List groups with their member counts.
pub fn list_groups(state: &SharedState) -> Vec<GroupSummary> {
    let registry = state.registry();
    registry
        .group_names()
        .into_iter()
        .map(|name| GroupSummary {
            members: registry.get_group_clients(&name).len(),
            name,
        })
        .collect()
}

/// List the members of a group; empty when the group does not exist.
pub fn group_clients(state: &SharedState, name: &str) -> Vec<ClientSummary> {
    state
        .registry()
        .get_group_clients(name)
        .iter()
        .map(|client| ClientSummary::from(client.as_ref()))
        .collect()
}

/// Add a registered client to a group.
pub fn add_to_group(
    state: &SharedState,
    name: &str,
    id: Uuid,
) -> Result<MembershipResponse, ServiceError> {
    let registry = state.registry();
    let client = registry
        .get_client(id)
        .ok_or_else(|| client_not_found(id))?;
    let outcome = registry.add_to_group(name, &client);
    Ok(MembershipResponse {
        group: name.to_string(),
        client_id: id,
        outcome: outcome.into(),
    })
}

/// Remove a client from a group.
pub fn remove_from_group(
    state: &SharedState,
    name: &str,
    id: Uuid,
) -> Result<MembershipResponse, ServiceError> {
    let outcome = removal_outcome(state.registry().remove_from_group(name, id))
        .ok_or_else(|| ServiceError::NotFound(format!("group `{name}` does not exist")))?;
    Ok(MembershipResponse {
        group: name.to_string(),
        client_id: id,
        outcome,
    })
}

/// Change the advertised reconnect interval and push it to connected clients.
pub async fn change_reconnect_interval(
    state: &SharedState,
    request: ReconnectIntervalRequest,
) -> Result<(), ServiceError> {
    let audience = match request.group.as_deref() {
        Some(name) => Audience::group(name),
        None => Audience::all(),
    };
    state
        .registry()
        .change_reconnect_interval(request.interval_ms, &audience, Some(state.shutdown_token()))
        .await?;
    Ok(())
}

fn client_not_found(id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("client {id} is not connected"))
}
