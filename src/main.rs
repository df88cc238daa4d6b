use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use appgate::{
    FileAppConfigStore, GatewayService, HttpAppConfigStore, HttpHandler, ReqwestUpstreamClient,
    StaticTokenIdentity,
    config::{AppStoreConfig, GatewayConfig, GatewayConfigValidator, loader},
    metrics,
    ports::app_config_store::AppConfigStore,
    tracing_setup::{self, LogFormat},
    utils::GracefulShutdown,
};
use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "appgate.toml")]
    config: String,

    /// Log output format
    #[clap(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,

    /// Default log level when RUST_LOG is not set
    #[clap(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        #[clap(short, long, default_value = "appgate.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        #[clap(short, long, default_value = "appgate.toml")]
        config: String,
    },
    /// Start the gateway server (default)
    Serve {
        #[clap(short, long, default_value = "appgate.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config),
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config, &args.log_level, args.log_format).await,
        None => serve(&args.config, &args.log_level, args.log_format).await,
    }
}

async fn serve(config_path: &str, log_level: &str, log_format: LogFormat) -> Result<()> {
    tracing_setup::init_tracing(log_level, log_format)?;
    metrics::describe();

    let config = loader::load_config(config_path)
        .await
        .wrap_err_with(|| format!("Failed to load configuration from {config_path}"))?;
    GatewayConfigValidator::validate(&config).wrap_err("Invalid configuration")?;

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .wrap_err_with(|| format!("Invalid listen address {}", config.listen_addr))?;

    let shutdown = Arc::new(GracefulShutdown::new());
    let store = create_app_store(config_path, &config)?;
    let upstream = ReqwestUpstreamClient::new(&config.upstream)
        .map_err(|e| eyre!("Failed to create upstream client: {e}"))?;

    let gateway = GatewayService::new(
        Arc::new(StaticTokenIdentity::from_config(&config.auth)),
        store,
        Arc::new(upstream),
        config.gateway_settings(),
    )
    .with_shutdown(shutdown.token());

    let app = HttpHandler::new(Arc::new(gateway), config.gateway.max_upload_bytes).router();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!(
        %addr,
        tokens = config.auth.tokens.len(),
        "appgate server starting"
    );

    let signals = shutdown.clone();
    tokio::spawn(async move { signals.run_signal_handler().await });

    let token = shutdown.token();
    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
    };

    tokio::select! {
        result = server => {
            result.context("Server error")?;
            tracing::info!("Graceful shutdown completed");
        }
        reason = shutdown.drain_deadline() => {
            tracing::warn!(?reason, "Closing remaining connections");
        }
    }

    Ok(())
}

fn create_app_store(config_path: &str, config: &GatewayConfig) -> Result<Arc<dyn AppConfigStore>> {
    match &config.app_store {
        AppStoreConfig::File { reload_debounce_ms } => {
            let store = FileAppConfigStore::new(config_path, config.app_table())
                .watch(Duration::from_millis(*reload_debounce_ms))
                .wrap_err("Failed to watch configuration file")?;
            tracing::info!(apps = store.len(), "Serving app configurations from file");
            Ok(Arc::new(store))
        }
        AppStoreConfig::Http {
            url,
            token,
            timeout_secs,
        } => {
            tracing::info!(%url, "Serving app configurations from config service");
            Ok(Arc::new(HttpAppConfigStore::new(
                url.clone(),
                token.clone(),
                Duration::from_secs(*timeout_secs),
            )?))
        }
    }
}

/// Validate configuration file and exit
fn validate_config_command(config_path: &str) -> Result<()> {
    println!("Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match loader::load_config_sync(config_path) {
        Ok(config) => {
            println!("Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("Configuration validation: OK");
            println!();
            println!("Configuration Summary:");
            println!("   - Listen Address: {}", config.listen_addr);
            println!("   - Tokens: {}", config.auth.tokens.len());
            match &config.app_store {
                AppStoreConfig::File { .. } => println!("   - Apps (file): {}", config.apps.len()),
                AppStoreConfig::Http { url, .. } => println!("   - Apps (service): {url}"),
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("Common fixes:");
            println!("   - Ensure all upstream URLs start with http:// or https://");
            println!("   - Give every app an upstream_base_url and upstream_key");
            println!("   - Verify listen address format (e.g., '127.0.0.1:8700')");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# appgate configuration

# The address to listen on (APPGATE_LISTEN_ADDR overrides it)
listen_addr = "127.0.0.1:8700"

# Bearer tokens accepted from dashboard callers
[[auth.tokens]]
token = "change-me"
user_id = "admin"

[upstream]
connect_timeout_secs = 10
read_timeout_secs = 300

[gateway]
max_json_peek_bytes = 1048576
event_stream_buffer = 32
max_upload_bytes = 104857600

# Apps are read from this file and reloaded when it changes.
[app_store]
type = "file"

[apps.support-bot]
upstream_base_url = "https://api.example.com/v1"
upstream_key = "app-xxxxxxxx"
app_type = "chat"

# [apps.report-runner]
# upstream_base_url = "https://api.example.com/v1"
# upstream_key = "app-yyyyyyyy"
# app_type = "workflow"
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("Created default configuration at: {config_path}");
    println!("   Run 'appgate serve --config {config_path}' to start the server");
    Ok(())
}
