use async_trait::async_trait;
use http::HeaderMap;

use crate::core::types::User;

/// IdentityProvider defines the port for authenticating gateway callers.
///
/// The gateway calls it before any other work; returning `None` ends the
/// request with `401` and no further collaborator is touched.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Resolve the caller from the inbound request headers.
    async fn authenticate(&self, headers: &HeaderMap) -> Option<User>;
}
