use thiserror::Error;

use crate::sse::keepalive::KeepaliveOptions;

/// Registry-wide settings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseOptions {
    /// Keepalive driver settings.
    pub keepalive: KeepaliveOptions,
    /// Reconnect interval advertised to clients at handshake, in milliseconds.
    pub reconnect_interval: Option<u32>,
    /// Require `text/event-stream` to be listed explicitly in `Accept`.
    pub strict_accept: bool,
}

/// Invalid [`SseOptions`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    /// The keepalive interval is shorter than one second.
    #[error("keepalive interval must be at least one second")]
    KeepaliveInterval,
    /// The keepalive comment or event type is blank.
    #[error("keepalive content must not be blank")]
    KeepaliveContent,
}

impl SseOptions {
    /// Reject settings the keepalive driver cannot honour.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.keepalive.interval.as_secs() == 0 {
            return Err(OptionsError::KeepaliveInterval);
        }
        if self.keepalive.content.trim().is_empty() {
            return Err(OptionsError::KeepaliveContent);
        }
        Ok(())
    }
}
