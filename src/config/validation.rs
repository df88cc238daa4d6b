use std::{collections::HashSet, net::SocketAddr};

use crate::config::models::{AppStoreConfig, GatewayConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator. Collects every problem before failing.
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        errors.extend(Self::validate_tokens(config));
        errors.extend(Self::validate_limits(config));

        match &config.app_store {
            AppStoreConfig::File { .. } => {
                for (app_id, app) in &config.apps {
                    errors.extend(Self::validate_app(app_id, app));
                }
            }
            AppStoreConfig::Http { url, .. } => {
                if let Err(e) = Self::validate_url(url, "app_store.url") {
                    errors.push(e);
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:8700' or '0.0.0.0:8700')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_tokens(config: &GatewayConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if config.auth.tokens.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "auth.tokens".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for (i, entry) in config.auth.tokens.iter().enumerate() {
            let field = format!("auth.tokens[{i}]");
            if entry.token.trim().is_empty() {
                errors.push(ValidationError::InvalidField {
                    field: field.clone(),
                    message: "Token must not be empty".to_string(),
                });
            } else if !seen.insert(entry.token.as_str()) {
                errors.push(ValidationError::InvalidField {
                    field: field.clone(),
                    message: "Token is listed more than once".to_string(),
                });
            }
            if entry.user_id.trim().is_empty() {
                errors.push(ValidationError::InvalidField {
                    field,
                    message: "user_id must not be empty".to_string(),
                });
            }
        }
        errors
    }

    fn validate_limits(config: &GatewayConfig) -> Vec<ValidationError> {
        let checks = [
            ("upstream.connect_timeout_secs", config.upstream.connect_timeout_secs == 0),
            ("upstream.read_timeout_secs", config.upstream.read_timeout_secs == 0),
            ("gateway.max_json_peek_bytes", config.gateway.max_json_peek_bytes == 0),
            ("gateway.event_stream_buffer", config.gateway.event_stream_buffer == 0),
            ("gateway.max_upload_bytes", config.gateway.max_upload_bytes == 0),
        ];

        checks
            .into_iter()
            .filter(|(_, is_zero)| *is_zero)
            .map(|(field, _)| ValidationError::InvalidField {
                field: field.to_string(),
                message: "Must be greater than 0".to_string(),
            })
            .collect()
    }

    fn validate_app(app_id: &str, app: &crate::core::types::AppConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if !app.app_id.is_empty() && app.app_id != app_id {
            errors.push(ValidationError::InvalidField {
                field: format!("apps.{app_id}.app_id"),
                message: format!("Does not match the table key (got '{}')", app.app_id),
            });
        }
        if app.upstream_base_url.is_empty() {
            errors.push(ValidationError::MissingField {
                field: format!("apps.{app_id}.upstream_base_url"),
            });
        } else if let Err(e) =
            Self::validate_url(&app.upstream_base_url, &format!("apps.{app_id}.upstream_base_url"))
        {
            errors.push(e);
        }
        if app.upstream_key.is_empty() {
            errors.push(ValidationError::MissingField {
                field: format!("apps.{app_id}.upstream_key"),
            });
        }
        errors
    }

    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::models::ApiToken,
        core::types::{AppBehaviorType, AppConfig},
    };

    fn minimal_valid_config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.auth.tokens.push(ApiToken {
            token: "dev-token".into(),
            user_id: "alice".into(),
        });
        config.apps.insert(
            "support-bot".into(),
            AppConfig::new("", "https://api.example.com/v1", "app-123", AppBehaviorType::Chat),
        );
        config
    }

    #[test]
    fn validate_accepts_minimal_config() {
        assert!(GatewayConfigValidator::validate(&minimal_valid_config()).is_ok());
    }

    #[test]
    fn validate_rejects_bad_listen_address() {
        let mut config = minimal_valid_config();
        config.listen_addr = "localhost".into();
        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("Invalid listen address"));
    }

    #[test]
    fn validate_rejects_duplicate_and_empty_tokens() {
        let mut config = minimal_valid_config();
        config.auth.tokens.push(ApiToken {
            token: "dev-token".into(),
            user_id: "bob".into(),
        });
        config.auth.tokens.push(ApiToken {
            token: " ".into(),
            user_id: "carol".into(),
        });
        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Found 2 validation errors"));
        assert!(message.contains("more than once"));
        assert!(message.contains("must not be empty"));
    }

    #[test]
    fn validate_rejects_incomplete_app() {
        let mut config = minimal_valid_config();
        config.apps.insert(
            "broken".into(),
            AppConfig::new("", "ftp://files.example.com", "", AppBehaviorType::Workflow),
        );
        let message = GatewayConfigValidator::validate(&config)
            .unwrap_err()
            .to_string();
        assert!(message.contains("apps.broken.upstream_base_url"));
        assert!(message.contains("apps.broken.upstream_key"));
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let mut config = minimal_valid_config();
        config.gateway.event_stream_buffer = 0;
        let message = GatewayConfigValidator::validate(&config)
            .unwrap_err()
            .to_string();
        assert!(message.contains("gateway.event_stream_buffer"));
    }

    #[test]
    fn validate_checks_http_store_url_instead_of_apps() {
        let mut config = minimal_valid_config();
        config.apps.insert(
            "ignored".into(),
            AppConfig::new("", "", "", AppBehaviorType::Unknown),
        );
        config.app_store = AppStoreConfig::Http {
            url: "not a url".into(),
            token: None,
            timeout_secs: 5,
        };
        let message = GatewayConfigValidator::validate(&config)
            .unwrap_err()
            .to_string();
        assert!(message.contains("app_store.url"));
        assert!(!message.contains("apps.ignored"));
    }
}
