//! Server-Sent Events connection registry and broadcast engine.
//!
//! The HTTP layer hands each streaming request to [`handshake::accept`] together with a
//! [`ResponseSink`]; everything else (groups, fan-out, forced disconnects, keepalive) goes
//! through the [`Registry`].

/// Per-connection client handles.
pub mod client;
/// Registry and sink errors.
pub mod error;
/// Event payloads.
pub mod event;
pub mod frame;
/// Named client groups.
pub mod group;
pub mod handshake;
pub mod hooks;
pub mod identity;
pub mod keepalive;
/// Registry-wide settings.
pub mod options;
pub mod registry;
/// The inbound request as seen by the registry.
pub mod request;
pub mod sink;

pub use client::{Client, ClientId};
pub use error::{SinkError, SseError, SseResult};
pub use event::ServerSentEvent;
pub use frame::Frame;
pub use group::{AddToGroupResult, RemoveFromGroupResult};
pub use handshake::{Admission, Session};
pub use hooks::{ConnectedArgs, ConnectingArgs, DisconnectedArgs, Hooks, LifecycleEvent};
pub use identity::{
    ClientIdProvider, HeaderClientIdProvider, InMemoryNoReconnectStore, NewUuidClientIdProvider,
    NoOpNoReconnectStore, NoReconnectStore,
};
pub use keepalive::{KeepaliveDriver, KeepaliveKind, KeepaliveMode, KeepaliveOptions};
pub use options::{OptionsError, SseOptions};
pub use registry::{Audience, Registry, RegistryBuilder};
pub use request::{Principal, RequestContext};
pub use sink::{ChannelSink, ResponseSink, SinkReceiver};
