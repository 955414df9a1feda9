//! DTO definitions used by the control REST API and documentation layer.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        format_system_time,
        validation::{validate_data_lines, validate_single_line},
    },
    sse::{
        client::Client,
        event::ServerSentEvent,
        group::{AddToGroupResult, RemoveFromGroupResult},
    },
};

/// Projection of a connected client.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClientSummary {
    /// Client identifier.
    pub id: Uuid,
    /// False once the stream has ended.
    pub connected: bool,
    /// RFC 3339 timestamp of the handshake.
    pub connected_at: String,
    /// Names of the properties attached to the client.
    pub properties: Vec<String>,
}

impl From<&Client> for ClientSummary {
    fn from(client: &Client) -> Self {
        let mut properties = client.property_names();
        properties.sort();
        Self {
            id: client.id(),
            connected: client.is_connected(),
            connected_at: format_system_time(client.connected_at()),
            properties,
        }
    }
}

/// Projection of a group.
#[derive(Debug, Serialize, ToSchema)]
pub struct GroupSummary {
    /// Group name.
    pub name: String,
    /// Number of members.
    pub members: usize,
}

/// Event to deliver to one client.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct EventRequest {
    /// Optional event id, echoed back by reconnecting clients as `Last-Event-ID`.
    #[validate(custom(function = "validate_single_line"))]
    pub id: Option<String>,
    /// Optional event type.
    #[validate(custom(function = "validate_single_line"))]
    pub event: Option<String>,
    /// One `data:` line per entry.
    #[validate(length(min = 1), custom(function = "validate_data_lines"))]
    pub data: Vec<String>,
}

impl From<EventRequest> for ServerSentEvent {
    fn from(request: EventRequest) -> Self {
        ServerSentEvent {
            id: request.id,
            event_type: request.event,
            data: request.data,
        }
    }
}

/// Event to broadcast, optionally narrowed to a group and/or explicit client ids.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct BroadcastRequest {
    /// Optional event id.
    #[validate(custom(function = "validate_single_line"))]
    pub id: Option<String>,
    /// Optional event type.
    #[validate(custom(function = "validate_single_line"))]
    pub event: Option<String>,
    /// One `data:` line per entry.
    #[validate(length(min = 1), custom(function = "validate_data_lines"))]
    pub data: Vec<String>,
    /// Restrict delivery to members of this group.
    #[validate(length(min = 1))]
    pub group: Option<String>,
    /// Restrict delivery to these clients.
    #[serde(default)]
    pub client_ids: Option<Vec<Uuid>>,
}

impl BroadcastRequest {
    /// Event part of the request.
    pub fn to_event(&self) -> ServerSentEvent {
        ServerSentEvent {
            id: self.id.clone(),
            event_type: self.event.clone(),
            data: self.data.clone(),
        }
    }
}

/// Change of the advertised reconnect interval.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ReconnectIntervalRequest {
    /// New interval in milliseconds.
    #[validate(range(max = 86_400_000))]
    pub interval_ms: u32,
    /// Only push the `retry:` directive to this group.
    #[validate(length(min = 1))]
    pub group: Option<String>,
}

/// Outcome of a group membership change.
#[derive(Debug, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MembershipOutcome {
    /// The group already existed.
    AddedToExistingGroup,
    /// The group was created by this call.
    AddedToNewGroup,
    /// The client was a member and has been removed.
    RemovedFromExistingGroup,
    /// The client was not a member.
    NotInGroup,
}

impl From<AddToGroupResult> for MembershipOutcome {
    fn from(result: AddToGroupResult) -> Self {
        match result {
            AddToGroupResult::AddedToExistingGroup => MembershipOutcome::AddedToExistingGroup,
            AddToGroupResult::AddedToNewGroup => MembershipOutcome::AddedToNewGroup,
        }
    }
}

/// Response to a membership change.
#[derive(Debug, Serialize, ToSchema)]
pub struct MembershipResponse {
    /// Group name.
    pub group: String,
    /// Client identifier.
    pub client_id: Uuid,
    /// What changed.
    pub outcome: MembershipOutcome,
}

/// Maps [`RemoveFromGroupResult`] to an outcome; `None` when the group does not exist.
pub fn removal_outcome(result: RemoveFromGroupResult) -> Option<MembershipOutcome> {
    match result {
        RemoveFromGroupResult::NotFoundGroup => None,
        RemoveFromGroupResult::RemovedFromExistingGroup => {
            Some(MembershipOutcome::RemovedFromExistingGroup)
        }
        RemoveFromGroupResult::NotInGroup => Some(MembershipOutcome::NotInGroup),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_request_rejects_multiline_fields() {
        let request: EventRequest =
            serde_json::from_str(r#"{ "event": "a\nb", "data": ["ok"] }"#).expect("json");
        assert!(request.validate().is_err());

        let request: EventRequest =
            serde_json::from_str(r#"{ "data": ["line\r\nbreak"] }"#).expect("json");
        assert!(request.validate().is_err());

        let request: EventRequest = serde_json::from_str(r#"{ "data": [] }"#).expect("json");
        assert!(request.validate().is_err());
    }

    #[test]
    fn broadcast_request_converts_to_event() {
        let request: BroadcastRequest = serde_json::from_str(
            r#"{ "id": "7", "event": "score", "data": ["1", "2"], "group": "room" }"#,
        )
        .expect("json");
        assert!(request.validate().is_ok());

        let event = request.to_event();
        assert_eq!(event.id.as_deref(), Some("7"));
        assert_eq!(event.event_type.as_deref(), Some("score"));
        assert_eq!(event.data, vec!["1".to_string(), "2".to_string()]);
    }
}
