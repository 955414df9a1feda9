use std::error::Error;

use thiserror::Error;

/// Result alias for operations on clients and the registry.
pub type SseResult<T> = Result<T, SseError>;

/// Failures surfaced by the connection registry and client handles.
#[derive(Debug, Error)]
pub enum SseError {
    /// The client handle has already been disconnected.
    #[error("the client isn't connected")]
    NotConnected,
    /// Forced disconnects need both a client id provider and a no-reconnect store.
    #[error(
        "disconnecting a client requires a client id provider and a no-reconnect store to be configured"
    )]
    UnsupportedOperation,
    /// A broadcast observed its cancellation token before completing.
    #[error("operation cancelled")]
    Cancelled,
    /// Writing to the underlying response failed.
    #[error("failed to write to client response")]
    Sink(#[from] SinkError),
}

/// Error raised by a [`ResponseSink`](crate::sse::sink::ResponseSink) implementation.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The peer went away or the sink was already closed.
    #[error("response stream closed")]
    Closed,
    /// Any other transport failure.
    #[error("response stream failed: {message}")]
    Transport {
        /// What was being attempted.
        message: String,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl SinkError {
    /// Wrap an arbitrary transport failure.
    pub fn transport(message: impl Into<String>, source: impl Error + Send + Sync + 'static) -> Self {
        SinkError::Transport {
            message: message.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn transport_errors_keep_their_source() {
        let err = SinkError::transport("socket reset", io::Error::other("reset by peer"));
        assert_eq!(err.to_string(), "response stream failed: socket reset");
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("reset by peer")
        );

        let wrapped = SseError::from(err);
        assert!(matches!(wrapped, SseError::Sink(SinkError::Transport { .. })));
    }
}
