//! Resource layer of the Dify Grafana app plugin.
//!
//! This crate provides the resource routes a Grafana dashboard calls to reach
//! a Dify workflow/chat API. Credentials come from the app's instance
//! settings; requests are reshaped and forwarded, and responses (including
//! server-sent event streams) are relayed back to the caller.

pub mod config;
pub mod error;
pub mod handlers;
pub mod proxy;
pub mod routes;
pub mod settings;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;

pub use config::{AppConfig, InstanceSettings, UpstreamConfig};
pub use error::ApiError;
pub use settings::{DifyConfig, SettingsSource, StaticSettings};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Source of per-request instance settings
    pub settings: Arc<dyn SettingsSource>,
    /// Pooled client for upstream calls
    pub http_client: reqwest::Client,
    /// Fixed upstream values and limits
    pub upstream: Arc<UpstreamConfig>,
}

impl AppState {
    /// Create state serving a fixed set of instance settings.
    pub fn new(settings: InstanceSettings, upstream: UpstreamConfig) -> Result<Self> {
        Self::with_source(Arc::new(StaticSettings::new(settings)), upstream)
    }

    /// Create state reading instance settings from `source`.
    pub fn with_source(source: Arc<dyn SettingsSource>, upstream: UpstreamConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(upstream.connect_timeout())
            .build()
            .context("building upstream HTTP client")?;

        Ok(Self {
            settings: source,
            http_client,
            upstream: Arc::new(upstream),
        })
    }
}

/// Build the resource router, nested under `base_path` when one is given.
pub fn build_router(state: AppState, base_path: &str) -> Router {
    let base_path = base_path.trim_matches('/');
    let routes = routes::resource_routes();

    let router = if base_path.is_empty() {
        routes
    } else {
        Router::new().nest(&format!("/{base_path}"), routes)
    };

    router.with_state(state)
}
