//! Configuration data structures for the gateway.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files and
//! carry serde defaults so a minimal file only needs tokens and apps.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::{gateway::GatewaySettings, types::AppConfig};

fn default_listen_addr() -> String {
    "127.0.0.1:8700".to_string()
}

/// One accepted bearer token and the user it authenticates.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ApiToken {
    pub token: String,
    pub user_id: String,
}

/// Caller authentication
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: Vec<ApiToken>,
}

/// Outbound HTTP client settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    /// TCP/TLS connect deadline
    pub connect_timeout_secs: u64,
    /// Deadline between two reads of the upstream response; long enough for
    /// quiet stretches in an event stream
    pub read_timeout_secs: u64,
    /// How long an idle pooled connection is kept
    pub pool_idle_timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            read_timeout_secs: 300,
            pool_idle_timeout_secs: 90,
            user_agent: None,
        }
    }
}

/// Request pipeline limits
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayLimits {
    /// JSON bodies up to this size are inspected for an override field
    pub max_json_peek_bytes: usize,
    /// Chunks buffered per event stream before backpressure reaches the upstream
    pub event_stream_buffer: usize,
    /// Largest inbound multipart upload accepted
    pub max_upload_bytes: usize,
}

impl Default for GatewayLimits {
    fn default() -> Self {
        let settings = GatewaySettings::default();
        Self {
            max_json_peek_bytes: settings.max_json_peek_bytes,
            event_stream_buffer: settings.event_stream_buffer,
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Where app configurations come from
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppStoreConfig {
    /// The `[apps]` table of this file, reloaded when the file changes
    File {
        #[serde(default = "default_reload_debounce_ms")]
        reload_debounce_ms: u64,
    },
    /// External config service queried as `GET {url}/{app_id}`
    Http {
        url: String,
        #[serde(default)]
        token: Option<String>,
        #[serde(default = "default_store_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_reload_debounce_ms() -> u64 {
    250
}

fn default_store_timeout_secs() -> u64 {
    5
}

impl Default for AppStoreConfig {
    fn default() -> Self {
        AppStoreConfig::File {
            reload_debounce_ms: default_reload_debounce_ms(),
        }
    }
}

/// Main gateway configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub gateway: GatewayLimits,
    #[serde(default)]
    pub app_store: AppStoreConfig,
    /// App configurations keyed by app id
    #[serde(default)]
    pub apps: HashMap<String, AppConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            auth: AuthConfig::default(),
            upstream: UpstreamConfig::default(),
            gateway: GatewayLimits::default(),
            app_store: AppStoreConfig::default(),
            apps: HashMap::new(),
        }
    }
}

impl GatewayConfig {
    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            max_json_peek_bytes: self.gateway.max_json_peek_bytes,
            event_stream_buffer: self.gateway.event_stream_buffer,
        }
    }

    /// The apps table with each record's `app_id` filled in from its key.
    pub fn app_table(&self) -> HashMap<String, AppConfig> {
        self.apps
            .iter()
            .map(|(id, app)| {
                let mut app = app.clone();
                if app.app_id.is_empty() {
                    app.app_id = id.clone();
                }
                (id.clone(), app)
            })
            .collect()
    }
}
