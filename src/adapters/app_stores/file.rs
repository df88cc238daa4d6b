use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use eyre::{Context, Result};
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::{
    config::{GatewayConfigValidator, loader::load_config_sync},
    core::types::AppConfig,
    metrics,
    ports::app_config_store::{AppConfigStore, AppConfigStoreResult},
};

type AppTable = HashMap<String, AppConfig>;

/// App config store backed by the `[apps]` table of the gateway config file.
///
/// Lookups read an atomically swapped snapshot. When watching, a changed file
/// is reloaded after a short debounce; a file that fails to load or validate
/// leaves the previous table in place.
pub struct FileAppConfigStore {
    path: Option<PathBuf>,
    apps: Arc<ArcSwap<AppTable>>,
    // Dropping the watcher stops the reload task.
    _watcher: Option<notify::RecommendedWatcher>,
}

impl FileAppConfigStore {
    /// In-memory store with no backing file.
    pub fn from_apps(apps: AppTable) -> Self {
        Self {
            path: None,
            apps: Arc::new(ArcSwap::from_pointee(apps)),
            _watcher: None,
        }
    }

    /// Store seeded with `apps`, reloadable from `path`.
    pub fn new(path: impl Into<PathBuf>, apps: AppTable) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::from_apps(apps)
        }
    }

    pub fn len(&self) -> usize {
        self.apps.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reload the table from the backing file now.
    pub fn reload(&self) -> Result<usize> {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| eyre::eyre!("App store has no backing file"))?;
        reload_from(path, &self.apps)
    }

    /// Watch the backing file and reload on change.
    pub fn watch(mut self, debounce: Duration) -> Result<Self> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| eyre::eyre!("App store has no backing file to watch"))?;
        let file_name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("Invalid config path"))?
            .to_owned();

        let (tx, mut rx) = mpsc::channel::<()>(1);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    if (event.kind.is_modify() || event.kind.is_create())
                        && event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == Some(file_name.as_os_str()))
                    {
                        tracing::debug!("Config file changed: {:?}", event.kind);
                        let _ = tx.try_send(());
                    }
                }
                Err(e) => tracing::error!("File watch error: {:?}", e),
            }
        })?;

        let watch_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let watch_dir = if watch_dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            watch_dir
        };
        watcher
            .watch(watch_dir, RecursiveMode::NonRecursive)
            .wrap_err("Failed to watch config directory")?;

        let apps = self.apps.clone();
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                tokio::time::sleep(debounce).await;
                while rx.try_recv().is_ok() {}

                match reload_from(&path, &apps) {
                    Ok(count) => {
                        metrics::increment_config_reloads(true);
                        tracing::info!(apps = count, "Reloaded app configurations");
                    }
                    Err(e) => {
                        metrics::increment_config_reloads(false);
                        tracing::warn!(error = %e, "App config reload failed, keeping previous table");
                    }
                }
            }
            tracing::debug!("App config watcher stopped");
        });

        self._watcher = Some(watcher);
        Ok(self)
    }
}

fn reload_from(path: &Path, apps: &ArcSwap<AppTable>) -> Result<usize> {
    let path_str = path
        .to_str()
        .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", path.display()))?;
    let config = load_config_sync(path_str)?;
    GatewayConfigValidator::validate(&config).wrap_err("Reloaded config is invalid")?;

    let table = config.app_table();
    let count = table.len();
    apps.store(Arc::new(table));
    Ok(count)
}

#[async_trait]
impl AppConfigStore for FileAppConfigStore {
    async fn get_app_config(&self, app_id: &str) -> AppConfigStoreResult<Option<AppConfig>> {
        Ok(self.apps.load().get(app_id).cloned())
    }
}
