//! Serialisation of SSE protocol frames into their exact wire bytes.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::sse::event::ServerSentEvent;

const RETRY_FIELD: &[u8] = b"retry: ";
const COMMENT_FIELD: &[u8] = b": ";
const ID_FIELD: &[u8] = b"id: ";
const EVENT_FIELD: &[u8] = b"event: ";
const DATA_FIELD: &[u8] = b"data: ";
const END_OF_LINE: &[u8] = b"\r\n";

/// Encoded protocol unit ready to be written to any number of clients.
///
/// The buffer is immutable once built; cloning only bumps a reference count.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// Raw bytes of the frame.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle on the underlying buffer.
    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    /// Length of the frame in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the frame holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Frame")
            .field(&String::from_utf8_lossy(&self.bytes))
            .finish()
    }
}

impl From<&ServerSentEvent> for Frame {
    fn from(event: &ServerSentEvent) -> Self {
        encode_event(event)
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        encode_text(text)
    }
}

/// `retry: <interval>\r\n\r\n`
pub fn encode_retry(interval_ms: u32) -> Frame {
    encode_single_field(RETRY_FIELD, interval_ms.to_string().as_bytes())
}

/// `: <text>\r\n\r\n`, ignored by client event listeners.
pub fn encode_comment(text: &str) -> Frame {
    encode_single_field(COMMENT_FIELD, text.as_bytes())
}

/// `data: <text>\r\n\r\n`
pub fn encode_text(text: &str) -> Frame {
    encode_single_field(DATA_FIELD, text.as_bytes())
}

/// Encode a full event. Field order is always id, event, data.
pub fn encode_event(event: &ServerSentEvent) -> Frame {
    let id = non_blank(event.id.as_deref());
    let event_type = non_blank(event.event_type.as_deref());

    let mut capacity = END_OF_LINE.len();
    if let Some(id) = id {
        capacity += field_len(ID_FIELD, id.len());
    }
    if let Some(event_type) = event_type {
        capacity += field_len(EVENT_FIELD, event_type.len());
    }
    capacity += event
        .data
        .iter()
        .map(|line| field_len(DATA_FIELD, line.len()))
        .sum::<usize>();

    let mut buffer = BytesMut::with_capacity(capacity);
    if let Some(id) = id {
        put_field(&mut buffer, ID_FIELD, id.as_bytes());
    }
    if let Some(event_type) = event_type {
        put_field(&mut buffer, EVENT_FIELD, event_type.as_bytes());
    }
    for line in &event.data {
        put_field(&mut buffer, DATA_FIELD, line.as_bytes());
    }
    buffer.put_slice(END_OF_LINE);

    Frame {
        bytes: buffer.freeze(),
    }
}

fn encode_single_field(field: &[u8], value: &[u8]) -> Frame {
    let mut buffer = BytesMut::with_capacity(field_len(field, value.len()) + END_OF_LINE.len());
    put_field(&mut buffer, field, value);
    buffer.put_slice(END_OF_LINE);
    Frame {
        bytes: buffer.freeze(),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

fn field_len(field: &[u8], value_len: usize) -> usize {
    field.len() + value_len + END_OF_LINE.len()
}

fn put_field(buffer: &mut BytesMut, field: &[u8], value: &[u8]) {
    buffer.put_slice(field);
    buffer.put_slice(value);
    buffer.put_slice(END_OF_LINE);
}
