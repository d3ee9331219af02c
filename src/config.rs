//! Session configuration.
//!
//! Defaults are embedded from `default_config.toml`. A user file only needs the keys it
//! overrides; everything else falls back to the embedded values.

use std::fs;
use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::InitParameters;

const DEFAULT_CONFIG_TOML: &str = include_str!("default_config.toml");

static DEFAULTS: Lazy<SessionConfig> = Lazy::new(|| {
    toml::from_str(DEFAULT_CONFIG_TOML).expect("embedded default_config.toml must parse")
});

/// Process-wide settings a session is built with. Fixed for the session's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Native host name passed to the connector.
    pub host_name: String,
    /// Local application version reported in the handshake.
    pub app_version: String,
    /// Local API version; the host must report at least this.
    pub api_version: String,
    pub user_agent: String,
    /// Client type tag, e.g. `nativeAssistant`.
    pub client_type: String,
    /// Namespace prefix for request identifiers.
    pub request_id_prefix: String,
    /// Per-attempt response timeout.
    pub request_timeout_ms: u64,
    /// Attempts per request, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Pause before each reconnect-and-retry.
    pub retry_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        DEFAULTS.clone()
    }
}

impl SessionConfig {
    /// Parse a (possibly partial) TOML document layered over the embedded defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut merged: toml::Table = DEFAULT_CONFIG_TOML.parse()?;
        let overrides: toml::Table = s.parse()?;
        merged.extend(overrides);
        Ok(toml::Value::Table(merged).try_into()?)
    }

    /// Load a config file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&raw)?;
        tracing::debug!(path = %path.display(), host = %config.host_name, "loaded session config");
        Ok(config)
    }

    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = version.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_host_name(mut self, host_name: impl Into<String>) -> Self {
        self.host_name = host_name.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Parameters for the `init` handshake.
    pub fn init_parameters(&self) -> InitParameters {
        InitParameters {
            version: self.app_version.clone(),
            api_version: self.api_version.clone(),
            user_agent: self.user_agent.clone(),
            client_type: self.client_type.clone(),
        }
    }
}
