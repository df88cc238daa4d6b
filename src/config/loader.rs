use std::path::Path;

use config::{Config, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::GatewayConfig;

/// Environment variable that replaces `listen_addr` from the file.
pub const LISTEN_ADDR_ENV: &str = "APPGATE_LISTEN_ADDR";

/// Load configuration from a file, applying environment overrides.
pub async fn load_config(config_path: &str) -> Result<GatewayConfig> {
    load_config_with_overrides(config_path, std::env::var(LISTEN_ADDR_ENV).ok())
}

/// Load configuration from a file only. Used for reloads and `validate`.
pub fn load_config_sync(config_path: &str) -> Result<GatewayConfig> {
    load_config_with_overrides(config_path, None)
}

/// Load configuration from a file; YAML, JSON and TOML are picked by extension.
pub fn load_config_with_overrides(
    config_path: &str,
    listen_addr: Option<String>,
) -> Result<GatewayConfig> {
    let config_path = Path::new(config_path);

    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        _ => FileFormat::Toml,
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .set_override_option("listen_addr", listen_addr)
        .context("Failed to apply listen address override")?
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let gateway_config: GatewayConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(gateway_config)
}
