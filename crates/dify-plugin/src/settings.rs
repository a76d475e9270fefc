//! Plugin settings resolution.
//!
//! Every resource call that talks to Dify needs the app's `apiUrl` (from the
//! plain `jsonData` settings) and `apiKey` (from the decrypted secure
//! settings). They are resolved once per request by the [`DifyConfig`]
//! extractor and handed to the handler as a plain value.

use std::fmt;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde_json::{Map, Value};

use crate::AppState;
use crate::config::InstanceSettings;
use crate::error::{ApiError, ApiResult};

/// Secure settings key holding the Dify API key.
pub const API_KEY_FIELD: &str = "apiKey";

/// `jsonData` field holding the Dify base URL.
pub const API_URL_FIELD: &str = "apiUrl";

/// Where the settings of the app instance serving a request come from.
pub trait SettingsSource: Send + Sync {
    fn instance_settings(&self, parts: &Parts) -> Arc<InstanceSettings>;
}

/// A single, fixed set of instance settings shared by all requests.
#[derive(Debug, Clone)]
pub struct StaticSettings {
    settings: Arc<InstanceSettings>,
}

impl StaticSettings {
    pub fn new(settings: InstanceSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }
}

impl SettingsSource for StaticSettings {
    fn instance_settings(&self, _parts: &Parts) -> Arc<InstanceSettings> {
        Arc::clone(&self.settings)
    }
}

/// Connection details for the Dify API.
#[derive(Clone, PartialEq, Eq)]
pub struct DifyConfig {
    pub api_url: String,
    pub api_key: String,
}

impl fmt::Debug for DifyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DifyConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl DifyConfig {
    /// Extract `apiUrl` and `apiKey` from instance settings.
    ///
    /// Unparseable `jsonData` is an [`ApiError::InvalidSettings`]; missing or
    /// mistyped fields are [`ApiError::Configuration`].
    pub fn from_settings(settings: &InstanceSettings) -> ApiResult<Self> {
        let raw = settings.json_data.trim();
        let json_data: Option<Map<String, Value>> = if raw.is_empty() {
            None
        } else {
            serde_json::from_str(raw).map_err(ApiError::InvalidSettings)?
        };

        let api_url = json_data
            .as_ref()
            .and_then(|data| data.get(API_URL_FIELD))
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::configuration("apiUrl not found or not a string"))?;

        let api_key = settings
            .secure_value(API_KEY_FIELD)
            .ok_or_else(|| ApiError::configuration("API key is not set"))?;

        Ok(Self {
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

impl FromRequestParts<AppState> for DifyConfig {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let settings = state.settings.instance_settings(parts);
        DifyConfig::from_settings(&settings)
    }
}
