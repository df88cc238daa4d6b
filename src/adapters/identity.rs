use std::collections::HashMap;

use async_trait::async_trait;
use http::{HeaderMap, header};

use crate::{config::models::AuthConfig, core::types::User, ports::identity::IdentityProvider};

/// Identity provider backed by a fixed table of bearer tokens.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenIdentity {
    tokens: HashMap<String, String>,
}

impl StaticTokenIdentity {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            tokens: config
                .tokens
                .iter()
                .map(|t| (t.token.clone(), t.user_id.clone()))
                .collect(),
        }
    }

    fn bearer(headers: &HeaderMap) -> Option<&str> {
        let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
        let (scheme, token) = value.split_once(' ')?;
        scheme
            .eq_ignore_ascii_case("bearer")
            .then(|| token.trim())
            .filter(|t| !t.is_empty())
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenIdentity {
    async fn authenticate(&self, headers: &HeaderMap) -> Option<User> {
        let token = Self::bearer(headers)?;
        let user_id = self.tokens.get(token)?;
        Some(User {
            id: user_id.clone(),
        })
    }
}
