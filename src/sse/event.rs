use serde::Serialize;

/// Application-level event pushed to SSE clients.
///
/// `id` and `event_type` are omitted from the wire frame when absent or blank. Each entry of
/// `data` becomes its own `data:` line. Lines must not contain CR or LF themselves.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerSentEvent {
    /// Identifier the client echoes back through `Last-Event-ID` on reconnect.
    pub id: Option<String>,
    /// Event type used by clients for typed dispatch.
    pub event_type: Option<String>,
    /// Ordered data lines.
    pub data: Vec<String>,
}

impl ServerSentEvent {
    /// Empty event; add fields through the `with_*` helpers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Event carrying a single data line.
    pub fn text(data: impl Into<String>) -> Self {
        Self {
            data: vec![data.into()],
            ..Self::default()
        }
    }

    /// Event whose data lines are taken from `lines` in order.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            data: lines.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Serialise `payload` as JSON into a single data line.
    pub fn json<E, T>(event_type: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            id: None,
            event_type: event_type.into(),
            data: vec![serde_json::to_string(payload)?],
        })
    }

    /// Set the event identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the event type.
    pub fn with_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Append a data line.
    pub fn with_data(mut self, line: impl Into<String>) -> Self {
        self.data.push(line.into());
        self
    }
}

impl From<&str> for ServerSentEvent {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for ServerSentEvent {
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_event_serialises_payload_into_one_line() {
        #[derive(Serialize)]
        struct Payload {
            count: u32,
        }

        let event = ServerSentEvent::json(Some("counter".to_string()), &Payload { count: 3 })
            .expect("serialisable");
        assert_eq!(event.event_type.as_deref(), Some("counter"));
        assert_eq!(event.data, vec![r#"{"count":3}"#.to_string()]);
        assert!(event.id.is_none());
    }

    #[test]
    fn builders_compose() {
        let event = ServerSentEvent::new()
            .with_id("E1")
            .with_type("T1")
            .with_data("L1")
            .with_data("L2");
        assert_eq!(event, ServerSentEvent {
            id: Some("E1".into()),
            event_type: Some("T1".into()),
            data: vec!["L1".into(), "L2".into()],
        });
    }
}
