//! appgate - an authenticating gateway in front of conversational-AI app APIs.
//!
//! A dashboard calls `/gateway/{app_id}/{path...}` with its own credentials;
//! the gateway authenticates the caller, resolves the app's upstream URL and
//! key, rewrites the path for the app's behavior type and relays the single
//! upstream answer back: event streams byte-for-byte, audio as a binary
//! stream, everything else buffered as JSON or text.
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use appgate::{
//!     FileAppConfigStore, GatewayService, HttpHandler, ReqwestUpstreamClient,
//!     StaticTokenIdentity, config::loader::load_config,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg = load_config("appgate.toml").await?;
//! let gateway = GatewayService::new(
//!     Arc::new(StaticTokenIdentity::from_config(&cfg.auth)),
//!     Arc::new(FileAppConfigStore::from_apps(cfg.app_table())),
//!     Arc::new(ReqwestUpstreamClient::new(&cfg.upstream)?),
//!     cfg.gateway_settings(),
//! );
//! let app = HttpHandler::new(Arc::new(gateway), cfg.gateway.max_upload_bytes).router();
//! let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
//! axum::serve(listener, app).await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! **Ports** (traits for identity, app config lookup and the upstream call) are
//! separated from **adapters** (static tokens, file/HTTP config stores, a
//! reqwest client, the axum router). The request pipeline lives in `core` and
//! only talks to ports, so it is tested with in-memory collaborators.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::{
        FileAppConfigStore, HttpAppConfigStore, HttpHandler, ReqwestUpstreamClient,
        StaticTokenIdentity,
    },
    core::{GatewayError, GatewayService, GatewaySettings},
    utils::GracefulShutdown,
};
