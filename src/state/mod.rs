use std::sync::Arc;

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use validator::Validate;

use crate::{
    config::{AppConfig, ConfigError},
    sse::{
        hooks::{ConnectedArgs, Hooks},
        identity::{HeaderClientIdProvider, InMemoryNoReconnectStore},
        registry::{Registry, RegistryBuilder},
    },
};

/// Cheaply clonable handle on the application state.
pub type SharedState = Arc<AppState>;

/// Central application state: the connection registry and the configuration it was built from.
pub struct AppState {
    registry: Arc<Registry>,
    config: AppConfig,
    shutdown: CancellationToken,
}

impl AppState {
    /// Build the registry described by `config` and wrap everything in an [`Arc`].
    ///
    /// The configuration is validated first, so values that [`AppConfig::load`] would reject
    /// fail here too.
    pub fn new(config: AppConfig) -> Result<SharedState, ConfigError> {
        config.validate()?;
        let registry = build_registry(&config)?;
        Ok(Arc::new(Self {
            registry: Arc::new(registry),
            config,
            shutdown: CancellationToken::new(),
        }))
    }

    /// Connection registry shared by the stream and control endpoints.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Configuration the application was started with.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Fired once the server starts shutting down.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

fn build_registry(config: &AppConfig) -> Result<Registry, ConfigError> {
    let mut builder = RegistryBuilder::new().options(config.sse_options()?);

    // A stable id is what makes a forced disconnect stick.
    if let Some(header) = &config.client_id_header {
        builder = builder
            .client_id_provider(Arc::new(HeaderClientIdProvider::new(header.clone())))
            .no_reconnect_store(Arc::new(InMemoryNoReconnectStore::new()));
    }

    let policy = Arc::new(AdmissionPolicy {
        groups_header: config.groups_header.clone(),
        property_pattern: config.property_header_regex()?,
    });
    let hooks = Hooks::default()
        .on_connect({
            let policy = policy.clone();
            move |args| policy.apply(args)
        })
        .on_reconnect(move |args| policy.apply(args))
        .on_disconnect(|args| {
            debug!(client_id = %args.client.id(), "client left the registry");
        });

    Ok(builder.hooks(hooks).build()?)
}

/// What happens to every admitted client, based on its request headers.
struct AdmissionPolicy {
    groups_header: Option<String>,
    property_pattern: Option<Regex>,
}

impl AdmissionPolicy {
    fn apply(&self, args: &ConnectedArgs<'_>) {
        if let Some(pattern) = &self.property_pattern {
            args.add_properties_from_headers(pattern, false);
        }

        let Some(header) = &self.groups_header else {
            return;
        };
        let Some(value) = args.request.header_str(header) else {
            return;
        };
        for group in value.split(',').map(str::trim).filter(|name| !name.is_empty()) {
            args.registry.add_to_group(group, args.client);
        }
    }
}
