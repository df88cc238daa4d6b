//! Gateway failure taxonomy.
//!
//! Every stage returns [`GatewayError`]; the controller converts it into a
//! terminal JSON response at a single boundary. Each variant owns its status
//! code so the mapping cannot drift between call sites.
use axum::{
    Json,
    response::{IntoResponse, Response},
};
use http::StatusCode;
use serde_json::json;
use thiserror::Error;

/// Error produced while handling a gateway call.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// No authenticated caller
    #[error("Unauthorized")]
    Unauthorized,

    /// Malformed inbound path or an identifier the store does not know
    #[error("{0}")]
    BadRequest(String),

    /// Multipart upload could not be parsed
    #[error("Failed to parse multipart form data")]
    MultipartParse { details: String },

    /// Stored configuration exists but is unusable, or the store failed
    #[error("{0}")]
    ServerConfig(String),

    /// Upstream answered but its body could not be read
    #[error("Failed to read upstream response body (upstream status {upstream_status})")]
    UpstreamBodyUnreadable {
        upstream_status: StatusCode,
        details: String,
    },

    /// Network-level failure invoking the upstream
    #[error("Failed to reach upstream for app '{app_id}'")]
    UpstreamUnreachable {
        app_id: String,
        method: String,
        details: String,
    },
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::BadRequest(_) | GatewayError::MultipartParse { .. } => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::ServerConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::UpstreamBodyUnreadable { .. }
            | GatewayError::UpstreamUnreachable { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized => "unauthorized",
            GatewayError::BadRequest(_) => "bad_request",
            GatewayError::MultipartParse { .. } => "multipart_parse",
            GatewayError::ServerConfig(_) => "server_config",
            GatewayError::UpstreamBodyUnreadable { .. } => "upstream_body_unreadable",
            GatewayError::UpstreamUnreachable { .. } => "upstream_unreachable",
        }
    }

    fn payload(&self) -> serde_json::Value {
        match self {
            GatewayError::MultipartParse { details } => json!({
                "error": self.to_string(),
                "details": details,
            }),
            GatewayError::UpstreamBodyUnreadable {
                upstream_status,
                details,
            } => json!({
                "error": self.to_string(),
                "upstreamStatus": upstream_status.as_u16(),
                "details": details,
            }),
            GatewayError::UpstreamUnreachable {
                app_id,
                method,
                details,
            } => json!({
                "error": self.to_string(),
                "appId": app_id,
                "method": method,
                "details": details,
            }),
            _ => json!({ "error": self.to_string() }),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.payload())).into_response()
    }
}
