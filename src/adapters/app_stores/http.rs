use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result};
use reqwest::{Client, StatusCode};

use crate::{
    core::types::AppConfig,
    ports::app_config_store::{AppConfigStore, AppConfigStoreError, AppConfigStoreResult},
};

/// Read-through app config store querying `GET {url}/{app_id}` on an external
/// config service. `404` means the app does not exist.
pub struct HttpAppConfigStore {
    url: String,
    token: Option<String>,
    client: Client,
}

impl HttpAppConfigStore {
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build config service client")?;
        Ok(Self {
            url: url.into(),
            token,
            client,
        })
    }

    fn record_url(&self, app_id: &str) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            urlencoding::encode(app_id)
        )
    }
}

#[async_trait]
impl AppConfigStore for HttpAppConfigStore {
    async fn get_app_config(&self, app_id: &str) -> AppConfigStoreResult<Option<AppConfig>> {
        let mut request = self.client.get(self.record_url(app_id));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| AppConfigStoreError::Unavailable(e.to_string()))?;

        match resp.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => {
                return Err(AppConfigStoreError::Unavailable(format!(
                    "Config service answered {status}"
                )));
            }
            _ => {}
        }

        let mut config =
            resp.json::<AppConfig>()
                .await
                .map_err(|e| AppConfigStoreError::InvalidRecord {
                    app_id: app_id.to_string(),
                    message: e.to_string(),
                })?;
        if config.app_id.is_empty() {
            config.app_id = app_id.to_string();
        }
        Ok(Some(config))
    }
}
