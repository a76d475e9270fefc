//! Service configuration.
//!
//! Values are layered from built-in defaults, an optional TOML file and
//! `DIFY_PLUGIN__*` environment variables.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Prefix for environment overrides, e.g. `DIFY_PLUGIN__SERVER__PORT`.
pub const ENV_PREFIX: &str = "DIFY_PLUGIN";

/// User identifier sent upstream on every call.
pub const DEFAULT_UPSTREAM_USER: &str = "grafana-user";

/// Response mode requested from workflow and chat endpoints.
pub const DEFAULT_RESPONSE_MODE: &str = "streaming";

/// Largest accepted inbound request body (10 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub plugin: InstanceSettings,
}

/// Listener configuration for the standalone binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Prefix the resource routes are nested under (empty for root).
    #[serde(default)]
    pub base_path: String,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    41830
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            base_path: String::new(),
        }
    }
}

/// Fixed values and limits applied to every upstream call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_response_mode")]
    pub response_mode: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated between two upstream body chunks.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_user() -> String {
    DEFAULT_UPSTREAM_USER.to_string()
}

fn default_response_mode() -> String {
    DEFAULT_RESPONSE_MODE.to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            user: default_user(),
            response_mode: default_response_mode(),
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// App instance settings as the plugin host hands them over.
///
/// `json_data` is kept as raw text so that malformed settings surface as an
/// error on the request that needs them rather than at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceSettings {
    #[serde(default)]
    pub json_data: String,
    #[serde(default)]
    pub decrypted_secure_json_data: HashMap<String, String>,
}

impl InstanceSettings {
    /// Look up a decrypted secure value.
    ///
    /// Environment overrides arrive with lower-cased keys, so an exact match
    /// is preferred and a case-insensitive one accepted.
    pub fn secure_value(&self, key: &str) -> Option<&str> {
        self.decrypted_secure_json_data
            .get(key)
            .or_else(|| {
                self.decrypted_secure_json_data
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }
}

impl AppConfig {
    /// Load configuration, layering `path` (if any) and the environment over
    /// the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("server.bind", default_bind())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("upstream.user", default_user())?
            .set_default("upstream.response_mode", default_response_mode())?;

        if let Some(path) = path {
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let built = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("building configuration")?;

        built
            .try_deserialize()
            .context("deserializing configuration")
    }

    /// Render the configuration as TOML with secrets masked.
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut redacted = self.clone();
        for value in redacted.plugin.decrypted_secure_json_data.values_mut() {
            *value = "********".to_string();
        }
        toml::to_string_pretty(&redacted).context("serializing configuration to TOML")
    }
}
