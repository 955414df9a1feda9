//! Periodic no-op frames keeping idle streams alive through intermediaries.

use std::{sync::Arc, time::Duration};

use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::sse::{
    error::SseError,
    event::ServerSentEvent,
    frame::{self, Frame},
    registry::{Audience, Registry},
};

/// Default keepalive period.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
/// Default keepalive payload.
pub const DEFAULT_KEEPALIVE_CONTENT: &str = "KEEPALIVE";

/// When the keepalive driver runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepaliveMode {
    /// Never start the driver.
    #[default]
    Never,
    /// Run for the registry's whole lifetime.
    Always,
    /// Run only when every configured proxy marker variable is set and non-empty.
    BehindProxy,
}

/// Shape of the keepalive frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepaliveKind {
    /// `: <content>`; invisible to event listeners.
    #[default]
    Comment,
    /// An event typed `<content>` with an empty data line.
    Event,
}

/// Keepalive settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeepaliveOptions {
    /// When the driver runs.
    pub mode: KeepaliveMode,
    /// Period between two keepalive frames.
    pub interval: Duration,
    /// Comment or event.
    pub kind: KeepaliveKind,
    /// Comment text, or event type.
    pub content: String,
    /// Environment variables that must all be non-empty for [`KeepaliveMode::BehindProxy`].
    pub proxy_env_markers: Vec<String>,
}

impl Default for KeepaliveOptions {
    fn default() -> Self {
        Self {
            mode: KeepaliveMode::default(),
            interval: DEFAULT_KEEPALIVE_INTERVAL,
            kind: KeepaliveKind::default(),
            content: DEFAULT_KEEPALIVE_CONTENT.to_string(),
            proxy_env_markers: default_proxy_env_markers(),
        }
    }
}

impl KeepaliveOptions {
    /// Encoded keepalive frame.
    pub fn frame(&self) -> Frame {
        match self.kind {
            KeepaliveKind::Comment => frame::encode_comment(&self.content),
            KeepaliveKind::Event => frame::encode_event(
                &ServerSentEvent::new()
                    .with_type(self.content.clone())
                    .with_data(""),
            ),
        }
    }

    /// Whether the driver should start in the current process environment.
    pub fn should_run(&self) -> bool {
        self.should_run_with(|name| std::env::var(name).ok())
    }

    fn should_run_with(&self, lookup: impl Fn(&str) -> Option<String>) -> bool {
        match self.mode {
            KeepaliveMode::Never => false,
            KeepaliveMode::Always => true,
            KeepaliveMode::BehindProxy => {
                !self.proxy_env_markers.is_empty()
                    && self
                        .proxy_env_markers
                        .iter()
                        .all(|name| lookup(name).is_some_and(|value| !value.is_empty()))
            }
        }
    }
}

/// Variables set by a reverse-proxy module hosting the process.
pub fn default_proxy_env_markers() -> Vec<String> {
    ["ASPNETCORE_PORT", "ASPNETCORE_APPL_PATH", "ASPNETCORE_TOKEN"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Background task broadcasting the keepalive frame.
pub struct KeepaliveDriver;

impl KeepaliveDriver {
    /// Start the driver unless its mode says otherwise.
    ///
    /// The mode is evaluated once, here. The task stops when `shutdown` fires, at the latest
    /// once the in-flight broadcast has finished.
    pub fn spawn(registry: Arc<Registry>, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        let options = registry.options().keepalive.clone();
        if !options.should_run() {
            debug!(mode = ?options.mode, "keepalive driver not started");
            return None;
        }

        info!(
            interval_secs = options.interval.as_secs(),
            kind = ?options.kind,
            "starting keepalive driver"
        );
        Some(tokio::spawn(run(registry, options, shutdown)))
    }
}

async fn run(registry: Arc<Registry>, options: KeepaliveOptions, shutdown: CancellationToken) {
    let frame = options.frame();
    loop {
        match registry
            .send_frame(&frame, &Audience::all(), Some(&shutdown))
            .await
        {
            Ok(()) => {}
            Err(SseError::Cancelled) => break,
            Err(err) => warn!(error = %err, "keepalive broadcast failed"),
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(options.interval) => {}
        }
    }
    info!("keepalive driver stopped");
}
