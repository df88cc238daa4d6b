//! Credential resolution: stored app config or caller override.
use std::sync::Arc;

use crate::{
    core::{
        error::GatewayError,
        types::{OverrideCredential, ResolvedTarget},
    },
    ports::app_config_store::AppConfigStore,
};

/// Resolves the upstream target for an app id.
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn AppConfigStore>,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn AppConfigStore>) -> Self {
        Self { store }
    }

    /// A complete override wins without touching the store. Unknown apps are
    /// the caller's fault (400); unusable stored records are ours (500).
    pub async fn resolve(
        &self,
        app_id: &str,
        override_cred: Option<OverrideCredential>,
    ) -> Result<ResolvedTarget, GatewayError> {
        if let Some(cred) = override_cred.filter(OverrideCredential::is_complete) {
            tracing::debug!(app_id, "Using caller-supplied override credential");
            return Ok(ResolvedTarget::Override(cred));
        }

        let config = self
            .store
            .get_app_config(app_id)
            .await
            .map_err(|e| {
                tracing::error!(app_id, error = %e, "App config lookup failed");
                GatewayError::ServerConfig(format!(
                    "Failed to load configuration for app '{app_id}'"
                ))
            })?
            .ok_or_else(|| {
                GatewayError::BadRequest(format!("Configuration for app '{app_id}' not found"))
            })?;

        if config.upstream_base_url.is_empty() || config.upstream_key.is_empty() {
            tracing::error!(app_id, "Stored app config is missing upstream url or key");
            return Err(GatewayError::ServerConfig(format!(
                "Configuration for app '{app_id}' is incomplete: upstream URL and key are required"
            )));
        }

        Ok(ResolvedTarget::Stored(config))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use http::StatusCode;

    use super::*;
    use crate::{
        core::types::{AppBehaviorType, AppConfig},
        ports::app_config_store::{AppConfigStoreError, AppConfigStoreResult},
    };

    #[derive(Default)]
    struct CountingStore {
        config: Option<AppConfig>,
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AppConfigStore for CountingStore {
        async fn get_app_config(&self, _app_id: &str) -> AppConfigStoreResult<Option<AppConfig>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppConfigStoreError::Unavailable("down".into()));
            }
            Ok(self.config.clone())
        }
    }

    fn resolver(store: CountingStore) -> (CredentialResolver, Arc<CountingStore>) {
        let store = Arc::new(store);
        (CredentialResolver::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_unknown_app_is_bad_request() {
        let (resolver, _) = resolver(CountingStore::default());
        let err = resolver.resolve("missing", None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Configuration for app 'missing' not found");
    }

    #[tokio::test]
    async fn test_incomplete_config_is_server_error() {
        for (url, key) in [("", "key"), ("https://api.example.com", ""), ("", "")] {
            let (resolver, _) = resolver(CountingStore {
                config: Some(AppConfig::new("app", url, key, AppBehaviorType::Chat)),
                ..Default::default()
            });
            let err = resolver.resolve("app", None).await.unwrap_err();
            assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_server_error() {
        let (resolver, _) = resolver(CountingStore {
            fail: true,
            ..Default::default()
        });
        let err = resolver.resolve("app", None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_complete_override_skips_store() {
        let (resolver, store) = resolver(CountingStore::default());
        let cred = OverrideCredential {
            upstream_base_url: "https://probe.example.com/v1".into(),
            upstream_key: "probe-key".into(),
            app_type: None,
        };
        let target = resolver.resolve("app", Some(cred)).await.unwrap();
        assert!(target.is_override());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_incomplete_override_falls_back_to_store() {
        let (resolver, store) = resolver(CountingStore {
            config: Some(AppConfig::new(
                "app",
                "https://api.example.com/v1",
                "stored-key",
                AppBehaviorType::Workflow,
            )),
            ..Default::default()
        });
        let cred = OverrideCredential {
            upstream_base_url: "https://probe.example.com/v1".into(),
            upstream_key: String::new(),
            app_type: None,
        };
        let target = resolver.resolve("app", Some(cred)).await.unwrap();
        assert!(!target.is_override());
        assert_eq!(target.key(), "stored-key");
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }
}
