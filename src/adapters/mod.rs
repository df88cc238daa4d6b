pub mod app_stores;
pub mod http_handler;
pub mod identity;
pub mod middleware;
pub mod upstream_client;

/// Re-export commonly used types from adapters
pub use app_stores::{FileAppConfigStore, HttpAppConfigStore};
pub use http_handler::HttpHandler;
pub use identity::StaticTokenIdentity;
pub use upstream_client::ReqwestUpstreamClient;
