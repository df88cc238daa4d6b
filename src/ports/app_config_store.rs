use async_trait::async_trait;
use thiserror::Error;

use crate::core::types::AppConfig;

/// Error type for config store lookups
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppConfigStoreError {
    /// Error when the backing store cannot be reached
    #[error("Config store unavailable: {0}")]
    Unavailable(String),

    /// Error when the stored record cannot be decoded
    #[error("Invalid config record for app '{app_id}': {message}")]
    InvalidRecord { app_id: String, message: String },
}

/// Result type for config store lookups
pub type AppConfigStoreResult<T> = Result<T, AppConfigStoreError>;

/// AppConfigStore defines the port for the external per-app configuration store.
///
/// The gateway only reads from it. `Ok(None)` means the app id is unknown.
#[async_trait]
pub trait AppConfigStore: Send + Sync + 'static {
    /// Look up the upstream configuration of an app.
    async fn get_app_config(&self, app_id: &str) -> AppConfigStoreResult<Option<AppConfig>>;
}
