//! The write side of one streaming HTTP response, as seen by a client handle.

use bytes::Bytes;
use futures::{FutureExt, future::BoxFuture};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::sse::{error::SinkError, frame::Frame};

/// Something frames can be written to, that can be closed, and that reports when the peer
/// has gone away.
///
/// A single in-flight `write` per sink is guaranteed by the owning client handle. Writes must
/// be cancel-safe at frame granularity: dropping a pending `write` future must leave either the
/// whole frame or nothing on the wire.
pub trait ResponseSink: Send + Sync {
    /// Write one complete frame.
    fn write(&mut self, frame: Frame) -> BoxFuture<'_, Result<(), SinkError>>;

    /// Terminate the response. Further writes fail with [`SinkError::Closed`].
    fn close(&mut self) -> BoxFuture<'_, ()>;

    /// Future resolving once the peer is gone or the sink has been closed.
    ///
    /// Called once at accept time, before the sink is handed to the client handle.
    fn closed(&self) -> BoxFuture<'static, ()>;
}

/// Sink backed by a bounded channel whose receiving half feeds the HTTP response body.
pub struct ChannelSink {
    sender: Option<mpsc::Sender<Bytes>>,
    gone: CancellationToken,
}

/// Receiving half of a [`ChannelSink`]. Dropping it (the HTTP layer does so when the client
/// goes away) signals [`ResponseSink::closed`].
pub struct SinkReceiver {
    receiver: mpsc::Receiver<Bytes>,
    _guard: DropGuard,
}

impl SinkReceiver {
    /// Next frame, or `None` once the sink is closed and drained.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.receiver.recv().await
    }
}

impl ChannelSink {
    /// Create a sink and the receiver the HTTP layer turns into a body stream.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> (Self, SinkReceiver) {
        let (sender, receiver) = mpsc::channel(capacity);
        let gone = CancellationToken::new();
        let receiver = SinkReceiver {
            receiver,
            _guard: gone.clone().drop_guard(),
        };
        let sink = Self {
            sender: Some(sender),
            gone,
        };
        (sink, receiver)
    }
}

impl ResponseSink for ChannelSink {
    fn write(&mut self, frame: Frame) -> BoxFuture<'_, Result<(), SinkError>> {
        async move {
            let sender = self.sender.as_ref().ok_or(SinkError::Closed)?;
            sender
                .send(frame.bytes())
                .await
                .map_err(|_| SinkError::Closed)
        }
        .boxed()
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        // Dropping the sender ends the body stream once buffered frames are drained.
        self.sender.take();
        self.gone.cancel();
        async {}.boxed()
    }

    fn closed(&self) -> BoxFuture<'static, ()> {
        self.gone.clone().cancelled_owned().boxed()
    }
}
