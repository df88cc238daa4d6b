pub mod app_config_store;
pub mod identity;
pub mod upstream_client;

pub use app_config_store::{AppConfigStore, AppConfigStoreError};
pub use identity::IdentityProvider;
pub use upstream_client::{UpstreamClient, UpstreamClientError};
