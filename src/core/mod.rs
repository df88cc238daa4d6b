pub mod credentials;
pub mod error;
pub mod gateway;
pub mod materializer;
pub mod path_rewrite;
pub mod relay;
pub mod sink;
pub mod types;

pub use error::GatewayError;
pub use gateway::{GatewayService, GatewaySettings};
pub use types::{AppBehaviorType, AppConfig, ProxyRequest, RequestContext};
