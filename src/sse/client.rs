use std::{
    any::Any,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::SystemTime,
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::sse::{
    error::{SseError, SseResult},
    event::ServerSentEvent,
    frame::{self, Frame},
    request::Principal,
    sink::ResponseSink,
};

/// Unique identifier of a client.
pub type ClientId = Uuid;

/// Value stored in a client's property bag.
pub type PropertyValue = Arc<dyn Any + Send + Sync>;

/// One open SSE stream.
///
/// A handle goes `Connected -> Disconnected` exactly once. Reconnecting clients always get a
/// fresh handle, even when they reuse the same [`ClientId`].
pub struct Client {
    id: ClientId,
    principal: Option<Principal>,
    connected_at: SystemTime,
    connected: AtomicBool,
    prevent_reconnect: AtomicBool,
    disconnect_supported: bool,
    writer: Mutex<Box<dyn ResponseSink>>,
    properties: DashMap<String, PropertyValue>,
    closing: CancellationToken,
}

impl Client {
    pub(crate) fn new(
        id: ClientId,
        principal: Option<Principal>,
        sink: Box<dyn ResponseSink>,
        disconnect_supported: bool,
    ) -> Self {
        Self {
            id,
            principal,
            connected_at: SystemTime::now(),
            connected: AtomicBool::new(true),
            prevent_reconnect: AtomicBool::new(false),
            disconnect_supported,
            writer: Mutex::new(sink),
            properties: DashMap::new(),
            closing: CancellationToken::new(),
        }
    }

    /// Unique identifier of the client.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Principal the HTTP layer authenticated for this stream.
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// When the stream was accepted.
    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    /// Whether frames can still be written to this client.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn prevents_reconnect(&self) -> bool {
        self.prevent_reconnect.load(Ordering::SeqCst)
    }

    /// Fires when the server side ends the stream (forced disconnect or failed write).
    pub(crate) fn closing(&self) -> &CancellationToken {
        &self.closing
    }

    /// Store `value` under `name`.
    ///
    /// Inserts when absent. An existing value is replaced only when `overwrite` is set. Returns
    /// whether a write happened.
    pub fn set_property<T>(&self, name: impl Into<String>, value: T, overwrite: bool) -> bool
    where
        T: Any + Send + Sync,
    {
        match self.properties.entry(name.into()) {
            Entry::Occupied(mut entry) => {
                if overwrite {
                    entry.insert(Arc::new(value));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(value));
                true
            }
        }
    }

    /// Typed lookup; `None` when absent or stored with another type.
    pub fn get_property<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.properties
            .get(name)
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }

    /// Remove `name`, returning the previous value when it had type `T`.
    pub fn remove_property<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.properties
            .remove(name)
            .and_then(|(_, value)| value.downcast::<T>().ok())
    }

    /// Names of all stored properties.
    pub fn property_names(&self) -> Vec<String> {
        self.properties
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Send a simple text event to this client.
    pub async fn send_text(&self, text: &str) -> SseResult<()> {
        self.send(&frame::encode_text(text), None).await
    }

    /// Send an event to this client.
    pub async fn send_event(&self, event: &ServerSentEvent) -> SseResult<()> {
        self.send(&frame::encode_event(event), None).await
    }

    /// Write an encoded frame.
    ///
    /// Writes to one client never interleave: they are serialised through the handle's writer
    /// lock. Fails with [`SseError::NotConnected`] once the handle is disconnected and with
    /// [`SseError::Cancelled`] when `cancel` fires first. A failed write disconnects the handle.
    pub async fn send(&self, frame: &Frame, cancel: Option<&CancellationToken>) -> SseResult<()> {
        if !self.is_connected() {
            return Err(SseError::NotConnected);
        }

        let mut writer = tokio::select! {
            biased;
            _ = cancelled(cancel) => return Err(SseError::Cancelled),
            _ = self.closing.cancelled() => return Err(SseError::NotConnected),
            writer = self.writer.lock() => writer,
        };

        // The flag may have flipped while we were queued behind another write.
        if !self.is_connected() {
            return Err(SseError::NotConnected);
        }

        let result = tokio::select! {
            biased;
            _ = cancelled(cancel) => return Err(SseError::Cancelled),
            _ = self.closing.cancelled() => return Err(SseError::NotConnected),
            result = writer.write(frame.clone()) => result,
        };

        if let Err(err) = result {
            drop(writer);
            if self.connected.swap(false, Ordering::SeqCst) {
                debug!(client_id = %self.id, error = %err, "write failed; marking client disconnected");
                self.closing.cancel();
            }
            return Err(err.into());
        }

        Ok(())
    }

    /// Forcibly end the stream and keep the client id from reconnecting once.
    ///
    /// Requires the registry to have been built with both a client id provider and a
    /// no-reconnect store. Calling it again is a no-op.
    pub async fn disconnect(&self) -> SseResult<()> {
        if !self.disconnect_supported {
            return Err(SseError::UnsupportedOperation);
        }

        self.prevent_reconnect.store(true, Ordering::SeqCst);

        if self.connected.swap(false, Ordering::SeqCst) {
            // Abort any in-flight write, then take the writer so nothing follows the close.
            self.closing.cancel();
            let mut writer = self.writer.lock().await;
            writer.close().await;
            info!(client_id = %self.id, "client disconnected by server");
        }

        Ok(())
    }

    /// End the stream because another handle took over this client's id.
    ///
    /// Aborts any in-flight write and wakes the session, whose teardown closes the sink.
    pub(crate) fn supersede(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            debug!(client_id = %self.id, "handle superseded by a newer stream");
        }
        self.closing.cancel();
    }

    /// Flip to disconnected, wait for any write already holding the writer to finish, then
    /// close the sink.
    ///
    /// Returns whether the handle was still connected.
    pub(crate) async fn mark_disconnected(&self) -> bool {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        let mut writer = self.writer.lock().await;
        writer.close().await;
        was_connected
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .field("prevent_reconnect", &self.prevents_reconnect())
            .finish_non_exhaustive()
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => future::pending().await,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{sync::Mutex as StdMutex, time::Duration};

    use futures::{FutureExt, future::BoxFuture};

    use super::*;
    use crate::sse::error::SinkError;

    /// Sink recording every frame it receives, optionally slowing each write down.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSink {
        pub(crate) frames: Arc<StdMutex<Vec<Vec<u8>>>>,
        pub(crate) closed: CancellationToken,
        pub(crate) delay: Option<Duration>,
        pub(crate) fail: bool,
    }

    impl RecordingSink {
        pub(crate) fn frames(&self) -> Vec<Vec<u8>> {
            self.frames.lock().expect("frames lock").clone()
        }
    }

    impl ResponseSink for RecordingSink {
        fn write(&mut self, frame: Frame) -> BoxFuture<'_, Result<(), SinkError>> {
            async move {
                if self.fail || self.closed.is_cancelled() {
                    return Err(SinkError::Closed);
                }
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                self.frames
                    .lock()
                    .expect("frames lock")
                    .push(frame.as_bytes().to_vec());
                Ok(())
            }
            .boxed()
        }

        fn close(&mut self) -> BoxFuture<'_, ()> {
            self.closed.cancel();
            async {}.boxed()
        }

        fn closed(&self) -> BoxFuture<'static, ()> {
            self.closed.clone().cancelled_owned().boxed()
        }
    }

    fn client(sink: RecordingSink, disconnect_supported: bool) -> Client {
        Client::new(Uuid::new_v4(), None, Box::new(sink), disconnect_supported)
    }

    #[test]
    fn set_property_respects_overwrite_flag() {
        let client = client(RecordingSink::default(), false);

        assert!(client.set_property("k", "v1".to_string(), false));
        assert!(!client.set_property("k", "v2".to_string(), false));
        assert_eq!(client.get_property::<String>("k").as_deref().map(String::as_str), Some("v1"));

        assert!(client.set_property("k", "v2".to_string(), true));
        assert_eq!(client.get_property::<String>("k").as_deref().map(String::as_str), Some("v2"));
    }

    #[test]
    fn absent_or_mistyped_property_is_none() {
        let client = client(RecordingSink::default(), false);
        assert!(client.get_property::<String>("missing").is_none());

        client.set_property("n", 7_u32, false);
        assert!(client.get_property::<String>("n").is_none());
        assert_eq!(client.get_property::<u32>("n").as_deref(), Some(&7));
        assert_eq!(client.remove_property::<u32>("n").as_deref(), Some(&7));
        assert!(client.get_property::<u32>("n").is_none());
    }

    #[test]
    fn concurrent_inserts_have_a_single_winner() {
        let client = Arc::new(client(RecordingSink::default(), false));
        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let client = client.clone();
                    scope.spawn(move || client.set_property("race", i, false))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("thread") as usize)
                .sum()
        });
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn send_writes_frame_bytes() {
        let sink = RecordingSink::default();
        let client = client(sink.clone(), false);
        client.send_text("hello").await.expect("send");
        assert_eq!(sink.frames(), vec![b"data: hello\r\n\r\n".to_vec()]);
    }

    #[tokio::test]
    async fn send_after_disconnect_is_rejected() {
        let sink = RecordingSink::default();
        let client = client(sink.clone(), true);
        client.disconnect().await.expect("disconnect");

        assert!(matches!(
            client.send_text("late").await,
            Err(SseError::NotConnected)
        ));
        assert!(sink.frames().is_empty());
        assert!(sink.closed.is_cancelled());
        assert!(client.prevents_reconnect());
    }

    #[tokio::test]
    async fn disconnect_without_collaborators_is_unsupported() {
        let client = client(RecordingSink::default(), false);
        assert!(matches!(
            client.disconnect().await,
            Err(SseError::UnsupportedOperation)
        ));
        assert!(client.is_connected());
        assert!(!client.prevents_reconnect());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let client = client(RecordingSink::default(), true);
        client.disconnect().await.expect("first");
        client.disconnect().await.expect("second");
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn failed_write_disconnects_the_handle() {
        let sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };
        let client = client(sink, false);
        assert!(matches!(client.send_text("x").await, Err(SseError::Sink(_))));
        assert!(!client.is_connected());
        assert!(client.closing().is_cancelled());
    }

    #[tokio::test]
    async fn concurrent_sends_do_not_interleave() {
        let sink = RecordingSink {
            delay: Some(Duration::from_millis(5)),
            ..RecordingSink::default()
        };
        let client = Arc::new(client(sink.clone(), false));
        let sends = (0..10).map(|i| {
            let client = client.clone();
            async move { client.send_text(&format!("m{i}")).await }
        });
        for result in futures::future::join_all(sends).await {
            result.expect("send");
        }

        let frames = sink.frames();
        assert_eq!(frames.len(), 10);
        for frame in frames {
            assert!(frame.starts_with(b"data: m") && frame.ends_with(b"\r\n\r\n"));
        }
    }

    #[tokio::test]
    async fn cancelled_send_returns_cancelled() {
        let client = client(RecordingSink::default(), false);
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            client.send(&frame::encode_text("x"), Some(&token)).await,
            Err(SseError::Cancelled)
        ));
    }
}
