//! Application-level configuration loading and conversion into registry options.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::sse::{
    keepalive::{
        DEFAULT_KEEPALIVE_CONTENT, DEFAULT_KEEPALIVE_INTERVAL, KeepaliveKind, KeepaliveMode,
        KeepaliveOptions, default_proxy_env_markers,
    },
    options::{OptionsError, SseOptions},
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/sse.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SSE_HUB_CONFIG_PATH";
/// Environment variable that overrides the configured control token.
const CONTROL_TOKEN_ENV: &str = "SSE_HUB_CONTROL_TOKEN";
/// Frames buffered per client before writes start waiting on the peer.
const DEFAULT_CHANNEL_CAPACITY: usize = 64;
/// Header listing the groups a connecting client joins.
const DEFAULT_GROUPS_HEADER: &str = "x-sse-groups";

/// Configuration failures detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ValidationErrors),
    /// The derived registry options are unusable.
    #[error("invalid registry options: {0}")]
    Options(#[from] OptionsError),
    /// `property_header_pattern` is not a valid regular expression.
    #[error("invalid property header pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Keepalive section of the configuration file.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct KeepaliveConfig {
    /// `never`, `always` or `behind_proxy`.
    pub mode: KeepaliveMode,
    /// Seconds between two keepalive frames.
    #[validate(range(min = 1))]
    pub interval_secs: u64,
    /// `comment` or `event`.
    pub kind: KeepaliveKind,
    /// Comment text or event type.
    #[validate(custom(function = "validate_not_blank"))]
    pub content: String,
    /// Variables that must all be set for `behind_proxy`.
    pub proxy_env_markers: Vec<String>,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            mode: KeepaliveMode::default(),
            interval_secs: DEFAULT_KEEPALIVE_INTERVAL.as_secs(),
            kind: KeepaliveKind::default(),
            content: DEFAULT_KEEPALIVE_CONTENT.to_string(),
            proxy_env_markers: default_proxy_env_markers(),
        }
    }
}

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    /// Keepalive driver settings.
    #[validate(nested)]
    pub keepalive: KeepaliveConfig,
    /// Advertised to clients at handshake, in milliseconds.
    pub reconnect_interval_ms: Option<u32>,
    /// Require `Accept: text/event-stream` on the stream endpoint.
    pub strict_accept: bool,
    /// Header carrying a stable client id. Enables forced disconnects.
    #[validate(length(min = 1))]
    pub client_id_header: Option<String>,
    /// Header listing (comma-separated) the groups a client joins on connect.
    #[validate(length(min = 1))]
    pub groups_header: Option<String>,
    /// Request headers matching this pattern are copied into client properties.
    #[validate(length(min = 1))]
    pub property_header_pattern: Option<String>,
    /// Shared secret for the control API; unset leaves it open.
    #[validate(length(min = 1))]
    pub control_token: Option<String>,
    /// Frames buffered per client stream.
    #[validate(range(min = 1, max = 65_536))]
    pub channel_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            keepalive: KeepaliveConfig::default(),
            reconnect_interval_ms: None,
            strict_accept: false,
            client_id_header: None,
            groups_header: Some(DEFAULT_GROUPS_HEADER.to_string()),
            property_header_pattern: None,
            control_token: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Load the configuration from disk, falling back to defaults when the file is missing or
    /// unreadable, then apply environment overrides and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        if let Some(token) = env::var(CONTROL_TOKEN_ENV).ok().filter(|token| !token.is_empty()) {
            config.control_token = Some(token);
        }

        config.validate()?;
        Ok(config)
    }

    /// Registry options derived from this configuration.
    pub fn sse_options(&self) -> Result<SseOptions, ConfigError> {
        let options = SseOptions {
            keepalive: KeepaliveOptions {
                mode: self.keepalive.mode,
                interval: Duration::from_secs(self.keepalive.interval_secs),
                kind: self.keepalive.kind,
                content: self.keepalive.content.clone(),
                proxy_env_markers: self.keepalive.proxy_env_markers.clone(),
            },
            reconnect_interval: self.reconnect_interval_ms,
            strict_accept: self.strict_accept,
        };
        options.validate()?;
        Ok(options)
    }

    /// Compiled `property_header_pattern`, if configured.
    pub fn property_header_regex(&self) -> Result<Option<Regex>, ConfigError> {
        Ok(self
            .property_header_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()?)
    }
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("value must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
